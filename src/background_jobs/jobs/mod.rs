mod counter_audit;
mod expiration_sweep;

pub use counter_audit::CounterAuditJob;
pub use expiration_sweep::ExpirationSweepJob;
