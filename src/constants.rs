// --- Constants ---

// Small value to compare floating point numbers
pub const EPSILON: f64 = 1e-9;

// Starting balance for users who have never traded
pub const INITIAL_BALANCE: f64 = 1000.0;

// Flat fee applied by settlement on top of curve cost/refund; the fee
// is credited to the prize pot. The curve engine itself is fee-agnostic.
pub const FEE_RATE: f64 = 0.02;

// Positive supply floor for the exponent == -1 curve configuration,
// where price and integral are undefined at zero supply.
pub const SUPPLY_FLOOR: f64 = 1e-9;

// Trade history responses return at most this many records
pub const HISTORY_LIMIT: usize = 50;
