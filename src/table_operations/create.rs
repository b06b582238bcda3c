use crate::schema::Schema;
use crate::transport::{CreateTableParams, Throughput};

/// Build the create-table request for `table_name` from the schema's key fields.
pub fn create_table_params(
    table_name: &str,
    schema: &Schema,
    throughput: Throughput,
) -> CreateTableParams {
    CreateTableParams {
        table_name: table_name.to_string(),
        key_schema: schema.key_schema(),
        attribute_definitions: schema.attribute_definitions(),
        throughput,
    }
}
