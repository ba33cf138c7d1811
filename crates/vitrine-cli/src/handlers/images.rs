use std::path::Path;

use serde_json::Value;
use vitrine_api_types::{
    CacheProductsRequest, CacheProductsResponse, ImageCleanupResponse, ImageStatsResponse,
};

use crate::args::ImagesCommands;
use crate::client::{CliError, Ctx};
use crate::print::print_json;

pub async fn handle(ctx: &Ctx, command: ImagesCommands) -> Result<(), CliError> {
    match command {
        ImagesCommands::Stats => {
            let response: ImageStatsResponse = ctx.get("cache/images", Vec::new()).await?;
            print_json(&response)
        }
        ImagesCommands::Cleanup { max_age_ms } => {
            let mut query = vec![("action", "cleanup".to_string())];
            if let Some(max_age) = max_age_ms {
                query.push(("maxAge", max_age.to_string()));
            }
            let response: ImageCleanupResponse = ctx.get("cache/images", query).await?;
            print_json(&response)
        }
        ImagesCommands::CacheProducts { file } => {
            let request = read_products(&file).await?;
            let response: CacheProductsResponse = ctx
                .post(
                    "cache/images",
                    vec![("action", "cache-products".to_string())],
                    &request,
                )
                .await?;
            print_json(&response)
        }
    }
}

async fn read_products(path: &Path) -> Result<CacheProductsRequest, CliError> {
    let raw = tokio::fs::read(path).await?;
    products_request(serde_json::from_slice(&raw)?)
}

fn products_request(document: Value) -> Result<CacheProductsRequest, CliError> {
    match document {
        Value::Array(products) => Ok(CacheProductsRequest { products }),
        Value::Object(_) => Ok(serde_json::from_value(document)?),
        _ => Err(CliError::InvalidArgument(
            "expected a JSON array of products or an object with `products`".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn accepts_bare_arrays_and_wrapped_products() {
        let bare = products_request(json!([{"id": 1}])).expect("array");
        assert_eq!(bare.products, vec![json!({"id": 1})]);

        let wrapped = products_request(json!({"products": [{"id": 2}]})).expect("object");
        assert_eq!(wrapped.products, vec![json!({"id": 2})]);

        assert!(products_request(json!("nope")).is_err());
    }
}
