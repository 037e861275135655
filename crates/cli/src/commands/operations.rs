use warden_core::OperationRegistry;

use crate::OutputFormat;

pub(crate) fn cmd_operations(output: OutputFormat) {
    let registry = OperationRegistry::with_core_operations();

    match output {
        OutputFormat::Json => {
            let ops: Vec<serde_json::Value> = registry
                .iter()
                .map(|d| {
                    serde_json::json!({
                        "id": d.id.to_string(),
                        "name": d.name,
                        "shape": d.shape().as_str(),
                        "operationType": d.operation_type.to_string(),
                        "executionSelector": d.execution_selector.to_string(),
                    })
                })
                .collect();
            println!("{}", serde_json::Value::Array(ops));
        }
        OutputFormat::Text => {
            for d in registry.iter() {
                println!(
                    "{:<20} {:<13} {}  {}",
                    d.id.to_string(),
                    d.shape().as_str(),
                    d.operation_type,
                    d.name
                );
            }
        }
    }
}
