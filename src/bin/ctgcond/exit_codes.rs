pub const SUCCESS: i32 = 0;
/// Unreadable recording, bad arguments or an invalid options document
pub const INPUT_ERROR: i32 = 1;
pub const EXECUTION_ERROR: i32 = 2;
/// Batch finished with some recordings failed
pub const PARTIAL_FAILURE: i32 = 3;
