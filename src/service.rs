pub mod admission;
pub mod capacity;
pub mod device_parser;
pub mod fingerprint;
