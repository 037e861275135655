use warden_engine::{Network, RpcNetwork, VerifierError};

use super::{fail, runtime};
use crate::OutputFormat;

pub(crate) fn cmd_probe(url: &str, output: OutputFormat, quiet: bool) {
    let network = RpcNetwork::new(url);
    tracing::debug!(url, "probing node");
    let rt = runtime(output, quiet);
    let result: Result<_, VerifierError> = rt.block_on(async {
        let chain_id = network.chain_id().await?;
        let gas_price = network.gas_price().await?;
        Ok((chain_id, gas_price))
    });
    let (chain_id, gas_price) = match result {
        Ok(answer) => answer,
        Err(e) => fail(&format!("{}: {}", url, e), output, quiet),
    };

    match output {
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({ "chainId": chain_id, "gasPrice": gas_price.to_string() })
        ),
        OutputFormat::Text => {
            println!("chain id:   {}", chain_id);
            println!("gas price:  {} wei", gas_price);
        }
    }
}
