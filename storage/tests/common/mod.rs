use heapstore::{Field, FieldType, Schema, Tuple};
use tracing_subscriber::EnvFilter;

/// Routes `log` output from the storage crate to the test writer.
/// Filter with `RUST_LOG`, e.g. `RUST_LOG=heapstore=trace`.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn id_name_schema() -> Schema {
    Schema::new(vec![FieldType::Int, FieldType::Char], vec!["id", "name"])
        .expect("valid schema")
}

pub fn row(id: i32, name: &str) -> Tuple {
    Tuple::new(vec![Field::Int(id), Field::Char(name.to_owned())])
}
