//! One activated chat.
//!
//! A chat activation pairs a controller task (room membership, initial
//! load, command handling) with the pure state machine it drives. The
//! host observes the activation through a watch channel of state
//! snapshots and steers it through [`ChatCommand`]s.
//!
//! [`ChatCommand`]: controller::ChatCommand

pub mod controller;
pub mod state;
