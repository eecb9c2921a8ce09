// crates/valor-economics/src/lib.rs
//
// valor-economics: the accounting engines of the Valor ledger. Continuous
// emission and the reward-per-share accumulator, staking with unstake locks,
// record-to-primary vesting, batched redemption priced by revenue reports,
// and cumulative merkle distributions.
//
// Engines are plain state machines over `u128` base units. They take the
// current timestamp as an argument and never perform I/O; composing them
// behind access control and a clock is the ledger crate's job.

pub mod distribution;
pub mod emission;
pub mod math;
pub mod redemption;
pub mod staking;
pub mod vesting;

// Re-export key types for ergonomic access from downstream crates.
pub use distribution::{
    ActivationPolicy, Distribution, MerkleDistributor, PreparedClaim, RootInfo, RootState,
};
pub use emission::GlobalEmissionState;
pub use math::{mul_div, mul_div_wide, to_amount, SafeMath, RATE_SCALE, SHARE_SCALE, U256};
pub use redemption::{
    Batch, RedemptionBatcher, RedemptionRequest, RevenueReport, RevenueState,
    DEFAULT_BATCH_DURATION_SECS,
};
pub use staking::{RewardAccumulator, UnstakeRequest, UserAccount, DEFAULT_UNSTAKE_LOCK_SECS};
pub use vesting::{
    VestingManager, VestingRequest, DEFAULT_VESTING_LINEAR_SECS, DEFAULT_VESTING_LOCK_SECS,
};
