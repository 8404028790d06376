pub mod allowlist;
pub mod earnings;

pub use allowlist::{AllowList, LocalAllowList, RemoteAllowList};
pub use earnings::{is_69_92_hand, EarningsStats, EarningsStore, EarningsUpdate, LocalEarningsStore, RemoteEarningsStore};
