//! Process-memory backend

use crate::error::Result;
use crate::storage::item::{AttributePatch, Filter, Item, ItemKey, SortKeyCondition};
use crate::storage::KeyValueStore;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Ordered in-memory table
///
/// Contents are lost when the table is dropped.
///
/// # Examples
///
/// ```
/// use sessionkeep::storage::{Item, ItemKey, KeyValueStore, MemoryTable, SortKeyCondition};
///
/// # #[tokio::main]
/// # async fn main() -> sessionkeep::error::Result<()> {
/// let table = MemoryTable::new();
/// table.put(Item::new(&ItemKey::new("SESSION#abc", "METADATA"))).await?;
/// let items = table.query("SESSION#abc", &SortKeyCondition::Any).await?;
/// assert_eq!(items.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryTable {
    items: RwLock<BTreeMap<ItemKey, Item>>,
}

impl MemoryTable {
    /// Creates an empty table
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryTable {
    async fn put(&self, item: Item) -> Result<()> {
        let key = item.key()?;
        self.items.write().await.insert(key, item);
        Ok(())
    }

    async fn query(&self, partition: &str, condition: &SortKeyCondition) -> Result<Vec<Item>> {
        let items = self.items.read().await;
        Ok(items
            .range(ItemKey::new(partition, "")..)
            .take_while(|(key, _)| key.pk == partition)
            .filter(|(key, _)| condition.matches(&key.sk))
            .map(|(_, item)| item.clone())
            .collect())
    }

    async fn scan(&self, filter: &Filter) -> Result<Vec<Item>> {
        let items = self.items.read().await;
        Ok(items
            .values()
            .filter(|item| filter.matches(item))
            .cloned()
            .collect())
    }

    async fn update(&self, key: &ItemKey, patch: &AttributePatch) -> Result<Option<Item>> {
        let mut items = self.items.write().await;
        Ok(items.get_mut(key).map(|item| {
            patch.apply_to(item);
            item.clone()
        }))
    }

    async fn batch_delete(&self, keys: &[ItemKey]) -> Result<usize> {
        let mut items = self.items.write().await;
        Ok(keys.iter().filter(|key| items.remove(key).is_some()).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_query_stays_inside_partition() {
        let table = MemoryTable::new();
        table
            .put(Item::new(&ItemKey::new("SESSION#a", "MESSAGE_1")))
            .await
            .unwrap();
        table
            .put(Item::new(&ItemKey::new("SESSION#ab", "MESSAGE_1")))
            .await
            .unwrap();

        let items = table.query("SESSION#a", &SortKeyCondition::Any).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].key().unwrap().pk, "SESSION#a");
    }

    #[tokio::test]
    async fn test_update_missing_item_writes_nothing() {
        let table = MemoryTable::new();
        let key = ItemKey::new("SESSION#a", "METADATA");
        let updated = table
            .update(&key, &AttributePatch::new().set("title", "x"))
            .await
            .unwrap();
        assert!(updated.is_none());
        assert!(table.scan(&Filter::new()).await.unwrap().is_empty());
    }
}
