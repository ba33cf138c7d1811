use vitrine_api_types::{
    CacheCommand, CacheCommandRequest, CacheCommandResponse, CollectionType, RefreshResponse,
    RefreshTarget,
};

use crate::args::{InvalidateArgs, RefreshArgs};
use crate::client::{CliError, Ctx};
use crate::print::print_json;

pub async fn init(ctx: &Ctx) -> Result<(), CliError> {
    let response: RefreshResponse = ctx.get_authorized("cache/init", Vec::new()).await?;
    report_refresh(&response)
}

pub async fn refresh(ctx: &Ctx, args: RefreshArgs) -> Result<(), CliError> {
    let target: RefreshTarget = args.target.as_deref().unwrap_or("all").parse()?;
    let response: RefreshResponse = ctx
        .get_authorized("cache/refresh", vec![("type", target.as_str().to_string())])
        .await?;
    report_refresh(&response)
}

pub async fn invalidate(ctx: &Ctx, args: InvalidateArgs) -> Result<(), CliError> {
    let request = invalidate_request(args)?;
    let response: CacheCommandResponse = ctx.post_authorized("cache/refresh", &request).await?;
    print_json(&response)
}

pub async fn stats(ctx: &Ctx) -> Result<(), CliError> {
    let request = CacheCommandRequest {
        action: CacheCommand::Stats,
        target: None,
        id: None,
    };
    let response: CacheCommandResponse = ctx.post_authorized("cache/refresh", &request).await?;
    print_json(&response)
}

fn invalidate_request(args: InvalidateArgs) -> Result<CacheCommandRequest, CliError> {
    let target = args
        .collection
        .as_deref()
        .map(str::parse::<RefreshTarget>)
        .transpose()?;
    if args.id.is_some() && target != Some(RefreshTarget::Collection(CollectionType::Products)) {
        return Err(CliError::InvalidArgument(
            "--id requires --type products".to_string(),
        ));
    }
    Ok(CacheCommandRequest {
        action: CacheCommand::Invalidate,
        target,
        id: args.id,
    })
}

fn report_refresh(response: &RefreshResponse) -> Result<(), CliError> {
    print_json(response)?;
    match &response.summary {
        Some(summary) if !summary.failed.is_empty() => Err(CliError::Incomplete {
            failed: summary.failed.len(),
        }),
        _ => Ok(()),
    }
}
