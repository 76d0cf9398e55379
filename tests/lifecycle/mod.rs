//! Volume lifecycle behaviour.

mod bdd_steps;
mod scenarios;
mod test_helpers;
