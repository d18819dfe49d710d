//! Shopping collections ("shops") and their items.
//!
//! A shop groups the items to buy at one place. Items are checked off as
//! they go into the basket; checked items can be exported as a task.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{next_timestamp, now_millis, Ranked, Syncable};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShoppingItem {
    pub id: Uuid,
    pub name: String,
    pub is_checked: bool,
}

impl ShoppingItem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            is_checked: false,
        }
    }

    pub fn checked(mut self) -> Self {
        self.is_checked = true;
        self
    }
}

impl fmt::Display for ShoppingItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let check = if self.is_checked { "[x]" } else { "[ ]" };
        write!(f, "{} {}", check, self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Shop {
    pub id: Uuid,
    pub name: String,
    pub items: Vec<ShoppingItem>,
    pub is_expanded: bool,
    /// Dense 0-based position among the owner's active shops.
    pub order: u32,
    pub last_modified: i64,
    pub owner: String,
    pub is_deleted: bool,
}

impl Shop {
    pub fn new(name: impl Into<String>, owner: impl Into<String>, order: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            items: Vec::new(),
            is_expanded: false,
            order,
            last_modified: now_millis(),
            owner: owner.into(),
            is_deleted: false,
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn with_items(mut self, items: Vec<ShoppingItem>) -> Self {
        self.items = items;
        self
    }

    pub fn with_last_modified(mut self, last_modified: i64) -> Self {
        self.last_modified = last_modified;
        self
    }

    pub fn deleted(mut self) -> Self {
        self.is_deleted = true;
        self
    }

    pub fn touch(&mut self) {
        self.last_modified = next_timestamp(self.last_modified);
    }

    pub fn checked_items(&self) -> impl Iterator<Item = &ShoppingItem> {
        self.items.iter().filter(|i| i.is_checked)
    }

    pub fn item_mut(&mut self, item_id: Uuid) -> Option<&mut ShoppingItem> {
        self.items.iter_mut().find(|i| i.id == item_id)
    }
}

impl Ranked for Shop {
    fn rank(&self) -> u32 {
        self.order
    }

    fn set_rank(&mut self, rank: u32) {
        self.order = rank;
    }
}

impl Syncable for Shop {
    const KIND: &'static str = "shop";

    fn id(&self) -> Uuid {
        self.id
    }

    fn last_modified(&self) -> i64 {
        self.last_modified
    }

    fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    fn owner(&self) -> Option<&str> {
        Some(&self.owner)
    }
}

impl fmt::Display for Shop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        writeln!(f, "{}", "=".repeat(self.name.len()))?;
        for item in &self.items {
            writeln!(f, "  {}", item)?;
        }
        Ok(())
    }
}
