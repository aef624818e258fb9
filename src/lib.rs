/*!
    communication fabric of a modular instrument: cpus sharing no memory exchange register values, commands and bulk data over two links

    - a uart link between a master and a slave cpu, carrying [command]s in hdlc style [frame]s. See [master::SlaveLink] and [slave::SlaveResponder]
    - a fifo fabric between the motherboard cpu and the modules in its slots, carrying register accesses ([serdes]) and large [message]s. Everything on it goes through a [backplane::Backplane]

    every wait is a busy-poll loop bounded by a [clock::Clock], nothing here spawns threads nor retries on its own. Bounds and switches are gathered in [config::Config].
*/

pub mod error;
pub mod config;
pub mod clock;
pub mod utils;
pub mod mutex;
pub mod registers;
pub mod address;

pub mod frame;
pub mod uart;
pub mod command;
pub mod master;
pub mod slave;

pub mod serdes;
pub mod backplane;
pub mod message;
pub mod dispatch;
mod requests;


pub use error::{Error, Result};
pub use config::Config;
pub use address::{SlotId, Target};
pub use backplane::Backplane;
