//! Page loops.

use flowrun_types::run::Item;
use serde_json::{json, Value};

use super::error::RequestError;
use super::path::get_path;
use super::request::RequestOptions;
use super::schema::{OffsetPagination, PageFetcher, Pagination};

/// Fetch everything for one item, paging when a strategy is active, and cap
/// the result at `max_results`.
pub async fn fetch_all(
    options: RequestOptions,
    pagination: Option<&Pagination>,
    max_results: Option<usize>,
    fetcher: &dyn PageFetcher,
) -> Result<Vec<Item>, RequestError> {
    let mut items = match pagination {
        None => fetcher.fetch_page(options).await?,
        Some(Pagination::Custom(strategy)) => strategy.paginate(options, fetcher).await?,
        Some(Pagination::Offset(offset)) => {
            paginate_offset(options, offset, max_results, fetcher).await?
        }
    };
    if let Some(max) = max_results {
        items.truncate(max);
    }
    Ok(items)
}

/// Limit/offset paging.
///
/// Stops on a short or empty page, once `max_results` items are collected,
/// or when a page after the first is not found.
pub async fn paginate_offset(
    mut options: RequestOptions,
    config: &OffsetPagination,
    max_results: Option<usize>,
    fetcher: &dyn PageFetcher,
) -> Result<Vec<Item>, RequestError> {
    let mut collected: Vec<Item> = Vec::new();
    let mut offset = 0usize;
    let mut page = 0usize;

    loop {
        let mut limit = config.page_size;
        if let Some(max) = max_results {
            let remaining = max.saturating_sub(collected.len());
            if remaining < 1 {
                break;
            }
            limit = limit.min(remaining);
        }

        let target = options.target_mut(config.target);
        target.insert(config.limit_parameter.clone(), json!(limit));
        target.insert(config.offset_parameter.clone(), json!(offset));

        let items = match fetcher.fetch_page(options.clone()).await {
            Ok(items) => items,
            Err(err) if page > 0 && err.is_not_found() => {
                tracing::debug!(page, offset, "page not found, ending pagination");
                break;
            }
            Err(err) => return Err(err),
        };
        let items = match &config.root_property {
            Some(property) => root_items(&items, property),
            None => items,
        };

        let count = items.len();
        collected.extend(items);
        page += 1;
        offset += config.page_size;
        tracing::debug!(page, count, total = collected.len(), "fetched page");

        if count == 0 || count != config.page_size {
            break;
        }
    }

    Ok(collected)
}

/// Page items found under `property` of the first response item.
fn root_items(items: &[Item], property: &str) -> Vec<Item> {
    items
        .first()
        .and_then(|item| get_path(&item.json, property))
        .and_then(Value::as_array)
        .map(|values| values.iter().cloned().map(Item::new).collect())
        .unwrap_or_default()
}
