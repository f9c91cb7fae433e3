pub const SUCCESS: i32 = 0;
pub const EXECUTION_ERROR: i32 = 1;
pub const CONFIG_ERROR: i32 = 3;
/// Serial port, ADC or another device could not be opened
pub const DEVICE_ERROR: i32 = 4;
/// The microcontroller did not answer in time
pub const TIMEOUT: i32 = 5;
