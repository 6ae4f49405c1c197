pub mod balances;
pub mod movements;
pub mod reservations;
pub mod stocktake;
pub mod transfers;

pub use balances::BalanceService;
pub use movements::MovementService;
pub use reservations::ReservationService;
pub use stocktake::StocktakeService;
pub use transfers::{TransferContext, TransferService};

use rand::Rng;

/// Generates a human-readable document number: prefix, UTC timestamp,
/// random suffix. Collisions are possible in principle; inserts retry
/// on the unique-index violation instead of trusting the suffix.
pub(crate) fn generate_number(prefix: &str) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..10_000);
    format!(
        "{}-{}-{:04}",
        prefix,
        chrono::Utc::now().format("%Y%m%d%H%M%S"),
        suffix
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_numbers_carry_the_prefix() {
        let n = generate_number("RSV");
        assert!(n.starts_with("RSV-"));
        assert_eq!(n.split('-').count(), 3);
    }
}
