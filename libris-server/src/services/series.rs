//! Series grouping

use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

use libris_common::models::{Item, ItemFilter};
use libris_common::Result;

use crate::store::Store;

/// Upper bound on the volume range scanned for gaps
const MAX_TRACKED_VOLUMES: i64 = 1000;

/// Items sharing a series name
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub name: String,
    pub items: Vec<Item>,
    /// Largest `total_volumes` any member reports
    pub total_volumes: Option<i64>,
    pub owned_volumes: Vec<i64>,
    pub missing_volumes: Vec<i64>,
}

/// Group items by series name, ignoring case
///
/// The spelling of the earliest-created member names the group.
pub fn group_series(mut items: Vec<Item>) -> Vec<Series> {
    items.sort_by_key(|i| i.created_at);

    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, (String, Vec<Item>)> = HashMap::new();
    for item in items {
        let Some(name) = item.series_name.clone() else {
            continue;
        };
        let key = name.trim().to_lowercase();
        if key.is_empty() {
            continue;
        }
        groups
            .entry(key.clone())
            .or_insert_with(|| {
                order.push(key);
                (name.trim().to_string(), Vec::new())
            })
            .1
            .push(item);
    }

    let mut series: Vec<Series> = order
        .into_iter()
        .filter_map(|key| groups.remove(&key))
        .map(|(name, mut items)| {
            items.sort_by(|a, b| {
                let volume = |i: &Item| i.volume_number.unwrap_or(i64::MAX);
                volume(a)
                    .cmp(&volume(b))
                    .then_with(|| a.title.to_lowercase().cmp(&b.title.to_lowercase()))
            });

            let total_volumes = items.iter().filter_map(|i| i.total_volumes).max();
            let owned: BTreeSet<i64> = items.iter().filter_map(|i| i.volume_number).collect();
            let missing_volumes = match total_volumes {
                Some(total) => (1..=total.min(MAX_TRACKED_VOLUMES))
                    .filter(|v| !owned.contains(v))
                    .collect(),
                None => Vec::new(),
            };

            Series {
                name,
                items,
                total_volumes,
                owned_volumes: owned.into_iter().collect(),
                missing_volumes,
            }
        })
        .collect();

    series.sort_by_key(|s| s.name.to_lowercase());
    series
}

/// Every series the owner has at least one item of
pub async fn list_series(store: &dyn Store, owner: &str) -> Result<Vec<Series>> {
    let items = store.list_items(owner, &ItemFilter::default()).await?;
    Ok(group_series(items))
}
