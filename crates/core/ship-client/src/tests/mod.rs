//! Connection, row iteration and packed transaction suites.

mod utils;

mod it_packed_transaction_test;
