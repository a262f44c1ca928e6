pub mod check_upkeep;
pub mod enter;
pub mod fulfill_random_words;
pub mod perform_upkeep;
pub mod retry_payout;
