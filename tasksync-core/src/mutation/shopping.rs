use std::fmt;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{is_blank, log_mirror_failure, mirror_target, MutationError};
use crate::db::LocalStore;
use crate::identity::IdentityProvider;
use crate::models::{move_item, rerank, Shop, ShoppingItem, SubTask, Task};
use crate::remote::RemoteRepository;

const EVENT_CAPACITY: usize = 16;

/// User-facing notifications from shopping intents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShoppingEvent {
    /// Checked items were exported as `tasks` new tasks.
    Exported { tasks: usize, items: usize },
    NothingToExport,
    NoTargetList,
}

impl fmt::Display for ShoppingEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShoppingEvent::Exported { tasks, items } => {
                write!(f, "Exported {} item(s) into {} task(s)", items, tasks)
            }
            ShoppingEvent::NothingToExport => write!(f, "No checked items to export"),
            ShoppingEvent::NoTargetList => write!(f, "Select a target list first"),
        }
    }
}

/// Applies shopping intents for the current owner.
#[derive(Debug, Clone)]
pub struct ShoppingMutator {
    store: LocalStore,
    remote: Option<RemoteRepository>,
    identity: IdentityProvider,
    events: broadcast::Sender<ShoppingEvent>,
}

impl ShoppingMutator {
    pub fn new(
        store: LocalStore,
        remote: Option<RemoteRepository>,
        identity: IdentityProvider,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            remote,
            identity,
            events,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ShoppingEvent> {
        self.events.subscribe()
    }

    fn owner(&self) -> String {
        self.identity.shopping_owner()
    }

    fn mirror(&self) -> Option<&RemoteRepository> {
        mirror_target(&self.remote, &self.owner())
    }

    fn notify(&self, event: ShoppingEvent) -> ShoppingEvent {
        // Nobody listening is fine.
        let _ = self.events.send(event.clone());
        event
    }

    async fn save_shop(&self, shop: &Shop) -> Result<(), MutationError> {
        self.store.shops.update(shop).await?;
        if let Some(remote) = self.mirror() {
            log_mirror_failure(remote.put_shop(shop).await, "shop", shop.id);
        }
        Ok(())
    }

    async fn save_shops(&self, shops: &[Shop]) -> Result<(), MutationError> {
        if shops.is_empty() {
            return Ok(());
        }
        self.store.shops.update_batch(shops).await?;
        if let Some(remote) = self.mirror() {
            if let Err(e) = remote.put_shops(shops).await {
                warn!(count = shops.len(), error = %e, "Remote shop batch failed, next sync will retry");
            }
        }
        Ok(())
    }

    /// Loads a live shop, applies `change` and saves it when `change`
    /// returns true.
    async fn edit_shop<F>(&self, shop_id: Uuid, change: F) -> Result<bool, MutationError>
    where
        F: FnOnce(&mut Shop) -> bool + Send,
    {
        let Some(mut shop) = self.store.shops.get_by_id(shop_id).await? else {
            return Ok(false);
        };
        if shop.is_deleted || !change(&mut shop) {
            return Ok(false);
        }
        shop.touch();
        self.save_shop(&shop).await?;
        Ok(true)
    }

    /// Active shops of the current owner, in order.
    pub async fn shops(&self) -> Result<Vec<Shop>, MutationError> {
        Ok(self.store.shops.active_by_owner(&self.owner()).await?)
    }

    /// Appends a new shop after the existing ones.
    pub async fn add_shop(&self, name: &str) -> Result<Option<Shop>, MutationError> {
        if is_blank(name) {
            return Ok(None);
        }
        let order = self.shops().await?.len() as u32;
        let shop = Shop::new(name, self.owner(), order);
        self.store.shops.insert(&shop).await?;
        if let Some(remote) = self.mirror() {
            log_mirror_failure(remote.put_shop(&shop).await, "shop", shop.id);
        }
        debug!(id = %shop.id, "Added shop");
        Ok(Some(shop))
    }

    pub async fn rename_shop(&self, shop_id: Uuid, name: &str) -> Result<bool, MutationError> {
        if is_blank(name) {
            return Ok(false);
        }
        let name = name.to_string();
        self.edit_shop(shop_id, move |shop| {
            shop.name = name;
            true
        })
        .await
    }

    /// Soft-deletes a shop and closes the gap in the ranking.
    pub async fn delete_shop(&self, shop_id: Uuid) -> Result<bool, MutationError> {
        let Some(mut shop) = self.store.shops.get_by_id(shop_id).await? else {
            return Ok(false);
        };
        if shop.is_deleted {
            return Ok(false);
        }
        shop.is_deleted = true;
        shop.touch();
        self.save_shop(&shop).await?;

        let mut remaining = self.shops().await?;
        let changed: Vec<Shop> = rerank(&mut remaining)
            .into_iter()
            .map(|index| {
                let mut sibling = remaining[index].clone();
                sibling.touch();
                sibling
            })
            .collect();
        self.save_shops(&changed).await?;
        Ok(true)
    }

    pub async fn toggle_shop_expanded(&self, shop_id: Uuid) -> Result<bool, MutationError> {
        self.edit_shop(shop_id, |shop| {
            shop.is_expanded = !shop.is_expanded;
            true
        })
        .await
    }

    /// Adds an unchecked item to a shop; returns its id.
    pub async fn add_item(&self, shop_id: Uuid, name: &str) -> Result<Option<Uuid>, MutationError> {
        if is_blank(name) {
            return Ok(None);
        }
        let item = ShoppingItem::new(name);
        let item_id = item.id;
        let added = self
            .edit_shop(shop_id, move |shop| {
                shop.items.push(item);
                true
            })
            .await?;
        Ok(added.then_some(item_id))
    }

    pub async fn rename_item(
        &self,
        shop_id: Uuid,
        item_id: Uuid,
        name: &str,
    ) -> Result<bool, MutationError> {
        if is_blank(name) {
            return Ok(false);
        }
        let name = name.to_string();
        self.edit_shop(shop_id, move |shop| match shop.item_mut(item_id) {
            Some(item) => {
                item.name = name;
                true
            }
            None => false,
        })
        .await
    }

    pub async fn delete_item(&self, shop_id: Uuid, item_id: Uuid) -> Result<bool, MutationError> {
        self.edit_shop(shop_id, |shop| {
            let before = shop.items.len();
            shop.items.retain(|i| i.id != item_id);
            shop.items.len() != before
        })
        .await
    }

    pub async fn set_item_checked(
        &self,
        shop_id: Uuid,
        item_id: Uuid,
        checked: bool,
    ) -> Result<bool, MutationError> {
        self.edit_shop(shop_id, |shop| match shop.item_mut(item_id) {
            Some(item) => {
                item.is_checked = checked;
                true
            }
            None => false,
        })
        .await
    }

    /// Unchecks every item of every shop; returns how many shops changed.
    pub async fn uncheck_all(&self) -> Result<usize, MutationError> {
        let changed: Vec<Shop> = self
            .shops()
            .await?
            .into_iter()
            .filter(|shop| shop.checked_items().next().is_some())
            .map(|mut shop| {
                for item in &mut shop.items {
                    item.is_checked = false;
                }
                shop.touch();
                shop
            })
            .collect();
        self.save_shops(&changed).await?;
        Ok(changed.len())
    }

    pub async fn move_shop(&self, from: usize, to: usize) -> Result<bool, MutationError> {
        let mut shops = self.shops().await?;
        if from == to || !move_item(&mut shops, from, to) {
            return Ok(false);
        }
        for shop in &mut shops {
            shop.touch();
        }
        self.save_shops(&shops).await?;
        Ok(true)
    }

    /// Turns the checked items of every shop into tasks of `target`.
    ///
    /// One task per shop with checked items, titled after the shop, with one
    /// subtask per checked item, appended after the list's existing tasks.
    /// The outcome is also published to event subscribers.
    pub async fn export_checked_to_list(
        &self,
        target: Option<Uuid>,
    ) -> Result<ShoppingEvent, MutationError> {
        let list = match target {
            Some(id) => self.store.lists.get_by_id(id).await?,
            None => None,
        };
        let Some(mut list) = list.filter(|l| !l.is_deleted) else {
            return Ok(self.notify(ShoppingEvent::NoTargetList));
        };

        let remote = mirror_target(&self.remote, &list.owner);
        let mut order = self.store.tasks.count_active_for_list(list.id).await?;
        let mut tasks = 0;
        let mut items = 0;

        for shop in self.shops().await? {
            let subtasks: Vec<SubTask> = shop
                .checked_items()
                .map(|item| SubTask::new(item.name.clone()))
                .collect();
            if subtasks.is_empty() {
                continue;
            }
            items += subtasks.len();

            let task = Task::new(list.id, shop.name.clone(), order).with_subtasks(subtasks);
            self.store.tasks.insert(&task).await?;
            if let Some(remote) = remote {
                log_mirror_failure(remote.put_task(&task).await, "task", task.id);
            }
            order += 1;
            tasks += 1;
        }

        if tasks == 0 {
            return Ok(self.notify(ShoppingEvent::NothingToExport));
        }

        list.touch();
        self.store.lists.update(&list).await?;
        if let Some(remote) = remote {
            log_mirror_failure(remote.put_list(&list).await, "list", list.id);
        }
        info!(list = %list.id, tasks, items, "Exported checked items");
        Ok(self.notify(ShoppingEvent::Exported { tasks, items }))
    }

    /// Plain-text rendering of the checked items, grouped by shop.
    pub async fn shareable_text(&self) -> Result<String, MutationError> {
        let mut text = String::from("Shopping list:\n");
        let mut any = false;

        for shop in self.shops().await? {
            let mut checked = shop.checked_items().peekable();
            if checked.peek().is_none() {
                continue;
            }
            any = true;
            text.push_str(&format!("\n{}:\n", shop.name));
            for item in checked {
                text.push_str(&format!("  - {}\n", item.name));
            }
        }

        if any {
            Ok(text)
        } else {
            Ok("Nothing to share. Check the items you want to send.".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{setup_store, TestStore};
    use crate::identity::LOCAL_SHOPPING_OWNER;
    use crate::models::TodoList;
    use crate::remote::MemoryRemoteStore;
    use std::sync::Arc;

    struct Fixture {
        ctx: TestStore,
        remote: RemoteRepository,
        remote_store: MemoryRemoteStore,
        shopping: ShoppingMutator,
    }

    async fn fixture(user: Option<&str>) -> Fixture {
        let ctx = setup_store().await;
        let remote_store = MemoryRemoteStore::new();
        let remote = RemoteRepository::new(Arc::new(remote_store.clone()));
        let identity = match user {
            Some(user) => IdentityProvider::signed_in(user).unwrap(),
            None => IdentityProvider::signed_out(),
        };
        let shopping = ShoppingMutator::new(ctx.store.clone(), Some(remote.clone()), identity);
        Fixture {
            ctx,
            remote,
            remote_store,
            shopping,
        }
    }

    async fn shop_with_items(f: &Fixture, name: &str, items: &[(&str, bool)]) -> Shop {
        let shop = f.shopping.add_shop(name).await.unwrap().unwrap();
        for (item, checked) in items {
            let id = f.shopping.add_item(shop.id, item).await.unwrap().unwrap();
            if *checked {
                f.shopping.set_item_checked(shop.id, id, true).await.unwrap();
            }
        }
        f.ctx.store.shops.get_by_id(shop.id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_export_creates_one_task_per_shop_with_checked_items() {
        let f = fixture(Some("alice")).await;
        let list = TodoList::new("Errands", "alice");
        f.ctx.store.lists.insert(&list).await.unwrap();
        f.ctx
            .store
            .tasks
            .insert(&Task::new(list.id, "Existing", 0))
            .await
            .unwrap();

        shop_with_items(&f, "Market", &[("apples", true), ("leeks", true), ("salt", false)]).await;
        shop_with_items(&f, "Bakery", &[("bread", false)]).await;
        let mut events = f.shopping.subscribe_events();

        let event = f.shopping.export_checked_to_list(Some(list.id)).await.unwrap();
        assert_eq!(event, ShoppingEvent::Exported { tasks: 1, items: 2 });
        assert_eq!(events.recv().await.unwrap(), event);

        let tasks = f.ctx.store.tasks.active_for_list(list.id).await.unwrap();
        assert_eq!(tasks.len(), 2);
        let exported = &tasks[1];
        assert_eq!(exported.title, "Market");
        assert_eq!(exported.in_list_order, 1);
        let subtasks: Vec<&str> = exported.subtasks.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(subtasks, vec!["apples", "leeks"]);
        assert!(exported.subtasks.iter().all(|s| !s.is_completed));

        let touched = f.ctx.store.lists.get_by_id(list.id).await.unwrap().unwrap();
        assert!(touched.last_modified > list.last_modified);
        assert_eq!(f.remote.fetch_tasks(list.id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_export_without_target_or_checked_items() {
        let f = fixture(Some("alice")).await;
        shop_with_items(&f, "Market", &[("apples", false)]).await;

        assert_eq!(
            f.shopping.export_checked_to_list(None).await.unwrap(),
            ShoppingEvent::NoTargetList
        );

        let list = TodoList::new("Errands", "alice");
        f.ctx.store.lists.insert(&list).await.unwrap();
        assert_eq!(
            f.shopping.export_checked_to_list(Some(list.id)).await.unwrap(),
            ShoppingEvent::NothingToExport
        );
        assert!(f.ctx.store.tasks.active_for_list(list.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_move_and_delete_keep_ranking_dense() {
        let f = fixture(Some("alice")).await;
        let a = f.shopping.add_shop("A").await.unwrap().unwrap();
        f.shopping.add_shop("B").await.unwrap();
        f.shopping.add_shop("C").await.unwrap();

        assert!(f.shopping.move_shop(0, 2).await.unwrap());
        let names: Vec<String> = f
            .shopping
            .shops()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["B", "C", "A"]);

        assert!(f.shopping.delete_shop(a.id).await.unwrap());
        assert!(!f.shopping.move_shop(5, 0).await.unwrap());
        let shops = f.shopping.shops().await.unwrap();
        let ranks: Vec<(String, u32)> = shops.into_iter().map(|s| (s.name, s.order)).collect();
        assert_eq!(ranks, vec![("B".to_string(), 0), ("C".to_string(), 1)]);

        let remote_a = f
            .remote
            .fetch_shops("alice")
            .await
            .into_iter()
            .find(|s| s.id == a.id)
            .unwrap();
        assert!(remote_a.is_deleted);
    }

    #[tokio::test]
    async fn test_failed_reorder_leaves_remote_ranking_untouched() {
        let f = fixture(Some("alice")).await;
        f.shopping.add_shop("A").await.unwrap();
        f.shopping.add_shop("B").await.unwrap();
        let c = f.shopping.add_shop("C").await.unwrap().unwrap();
        f.remote_store.fail_writes_for(&c.id.to_string()).await;

        assert!(f.shopping.move_shop(0, 2).await.unwrap());

        let local: Vec<(String, u32)> = f
            .shopping
            .shops()
            .await
            .unwrap()
            .into_iter()
            .map(|s| (s.name, s.order))
            .collect();
        assert_eq!(
            local,
            vec![("B".to_string(), 0), ("C".to_string(), 1), ("A".to_string(), 2)]
        );

        let mut remote: Vec<(String, u32)> = f
            .remote
            .fetch_shops("alice")
            .await
            .into_iter()
            .map(|s| (s.name, s.order))
            .collect();
        remote.sort();
        assert_eq!(
            remote,
            vec![("A".to_string(), 0), ("B".to_string(), 1), ("C".to_string(), 2)]
        );
    }

    #[tokio::test]
    async fn test_item_intents_touch_the_shop() {
        let f = fixture(Some("alice")).await;
        let shop = shop_with_items(&f, "Market", &[("apples", true)]).await;
        let item = shop.items[0].id;

        assert!(f.shopping.rename_item(shop.id, item, "pears").await.unwrap());
        assert!(!f.shopping.rename_item(shop.id, item, "").await.unwrap());
        assert!(f.shopping.toggle_shop_expanded(shop.id).await.unwrap());
        assert!(f.shopping.rename_shop(shop.id, "Farmers market").await.unwrap());

        let edited = f.ctx.store.shops.get_by_id(shop.id).await.unwrap().unwrap();
        assert_eq!(edited.name, "Farmers market");
        assert_eq!(edited.items[0].name, "pears");
        assert!(edited.is_expanded);
        assert!(edited.last_modified > shop.last_modified);
        assert_eq!(f.remote.fetch_shops("alice").await, vec![edited]);

        assert!(f.shopping.delete_item(shop.id, item).await.unwrap());
        assert!(!f.shopping.delete_item(shop.id, item).await.unwrap());
    }

    #[tokio::test]
    async fn test_uncheck_all_only_touches_shops_with_checked_items() {
        let f = fixture(Some("alice")).await;
        shop_with_items(&f, "Market", &[("apples", true), ("leeks", true)]).await;
        shop_with_items(&f, "Bakery", &[("bread", false)]).await;

        assert_eq!(f.shopping.uncheck_all().await.unwrap(), 1);
        let shops = f.shopping.shops().await.unwrap();
        assert!(shops.iter().all(|s| s.checked_items().next().is_none()));
        assert_eq!(f.shopping.uncheck_all().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_shareable_text() {
        let f = fixture(None).await;
        assert_eq!(
            f.shopping.shareable_text().await.unwrap(),
            "Nothing to share. Check the items you want to send."
        );

        shop_with_items(&f, "Market", &[("apples", true), ("salt", false)]).await;
        shop_with_items(&f, "Bakery", &[("bread", true)]).await;
        assert_eq!(
            f.shopping.shareable_text().await.unwrap(),
            "Shopping list:\n\nMarket:\n  - apples\n\nBakery:\n  - bread\n"
        );
    }

    #[tokio::test]
    async fn test_signed_out_shops_stay_local() {
        let f = fixture(None).await;
        let shop = f.shopping.add_shop("Market").await.unwrap().unwrap();
        assert_eq!(shop.owner, LOCAL_SHOPPING_OWNER);
        f.shopping.add_item(shop.id, "apples").await.unwrap();
        assert_eq!(f.remote_store.write_count(), 0);
    }
}
