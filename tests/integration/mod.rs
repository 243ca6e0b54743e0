pub mod eeprom;
pub mod jobs;
pub mod rpc;
pub mod watch;
