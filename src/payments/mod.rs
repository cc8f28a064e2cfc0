pub mod amortization;
pub mod distribution;

pub use amortization::{calculate_emi, AmortizationSchedule, EmiLine, MAX_TERM_MONTHS};
pub use distribution::{split_pro_rata, LenderShare};
