pub mod helpers;
mod tests_stats;
