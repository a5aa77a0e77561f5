//! Driver and polling loop for the RDTech UM24C/UM25C/UM34C USB meters
//! over their Bluetooth serial link.

pub mod collector;
pub mod devices;
