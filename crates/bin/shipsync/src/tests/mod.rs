//! Reflection, sink and monitor suites.

mod utils;

mod it_fill_sink_test;
mod it_schema_reflection_test;
