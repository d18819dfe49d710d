//! Shopping commands.
//!
//! Shops and items are addressed by their 1-based position in
//! `tasks shop show`.

use clap::{Args, Subcommand};
use tasksync_core::{Shop, ShoppingItem};

use super::{index, pick, report, CommandError, OutputFormat};
use crate::context::AppContext;

#[derive(Args)]
pub struct ShopCommand {
    #[command(subcommand)]
    pub command: ShopSubcommand,
}

#[derive(Subcommand)]
pub enum ShopSubcommand {
    /// Show shops and their items
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Add a shop
    Add { name: String },

    /// Rename a shop
    Rename { shop: usize, name: String },

    /// Delete a shop
    Delete { shop: usize },

    /// Move a shop to another position
    Move { from: usize, to: usize },

    /// Expand or collapse a shop's items
    Toggle { shop: usize },

    /// Add an item to a shop
    AddItem { shop: usize, name: String },

    /// Rename an item
    RenameItem {
        shop: usize,
        item: usize,
        name: String,
    },

    /// Remove an item
    RemoveItem { shop: usize, item: usize },

    /// Check an item (in the basket)
    Check { shop: usize, item: usize },

    /// Uncheck an item
    Uncheck { shop: usize, item: usize },

    /// Uncheck every item of every shop
    UncheckAll,

    /// Add checked items to a to-do list, one task per shop
    Export {
        /// Target list position (defaults to the selected list)
        #[arg(long, short)]
        list: Option<usize>,
    },

    /// Print checked items as shareable text
    Share,
}

impl ShopCommand {
    pub fn is_write(&self) -> bool {
        !matches!(
            self.command,
            ShopSubcommand::Show { .. } | ShopSubcommand::Share
        )
    }

    pub async fn run(&self, ctx: &AppContext) -> Result<(), CommandError> {
        let shopping = &ctx.shopping;
        let shops = shopping.shops().await?;

        match &self.command {
            ShopSubcommand::Show { format } => match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&shops)?),
                OutputFormat::Text => print_shops(&shops),
            },
            ShopSubcommand::Add { name } => match shopping.add_shop(name).await? {
                Some(shop) => println!("Added shop: {}", shop.name),
                None => println!("Shop name must not be blank."),
            },
            ShopSubcommand::Rename { shop, name } => {
                let shop = pick(&shops, "shop", *shop)?;
                report(shopping.rename_shop(shop.id, name).await?, "Shop renamed.");
            }
            ShopSubcommand::Delete { shop } => {
                let shop = pick(&shops, "shop", *shop)?;
                report(
                    shopping.delete_shop(shop.id).await?,
                    &format!("Deleted shop: {}", shop.name),
                );
            }
            ShopSubcommand::Move { from, to } => {
                let moved = shopping
                    .move_shop(index("shop", *from)?, index("shop", *to)?)
                    .await?;
                report(moved, "Shop moved.");
            }
            ShopSubcommand::Toggle { shop } => {
                let shop = pick(&shops, "shop", *shop)?;
                report(shopping.toggle_shop_expanded(shop.id).await?, "Shop toggled.");
            }
            ShopSubcommand::AddItem { shop, name } => {
                let shop = pick(&shops, "shop", *shop)?;
                match shopping.add_item(shop.id, name).await? {
                    Some(_) => println!("Added {} to {}", name.trim(), shop.name),
                    None => println!("Nothing changed."),
                }
            }
            ShopSubcommand::RenameItem { shop, item, name } => {
                let (shop, item) = pick_item(&shops, *shop, *item)?;
                report(
                    shopping.rename_item(shop.id, item.id, name).await?,
                    "Item renamed.",
                );
            }
            ShopSubcommand::RemoveItem { shop, item } => {
                let (shop, item) = pick_item(&shops, *shop, *item)?;
                report(
                    shopping.delete_item(shop.id, item.id).await?,
                    &format!("Removed {}", item.name),
                );
            }
            ShopSubcommand::Check { shop, item } => {
                let (shop, item) = pick_item(&shops, *shop, *item)?;
                report(
                    shopping.set_item_checked(shop.id, item.id, true).await?,
                    &format!("Checked {}", item.name),
                );
            }
            ShopSubcommand::Uncheck { shop, item } => {
                let (shop, item) = pick_item(&shops, *shop, *item)?;
                report(
                    shopping.set_item_checked(shop.id, item.id, false).await?,
                    &format!("Unchecked {}", item.name),
                );
            }
            ShopSubcommand::UncheckAll => {
                let changed = shopping.uncheck_all().await?;
                println!("Unchecked items in {} shop(s).", changed);
            }
            ShopSubcommand::Export { list } => {
                let target = match list {
                    Some(position) => {
                        let lists = ctx.todo.active_lists().await?;
                        Some(pick(&lists, "list", *position)?.id)
                    }
                    None => ctx.todo.selected_list().await?.map(|l| l.id),
                };
                let event = shopping.export_checked_to_list(target).await?;
                println!("{}", event);
            }
            ShopSubcommand::Share => {
                println!("{}", shopping.shareable_text().await?.trim_end());
            }
        }
        Ok(())
    }
}

fn pick_item(
    shops: &[Shop],
    shop: usize,
    item: usize,
) -> Result<(&Shop, &ShoppingItem), CommandError> {
    let shop = pick(shops, "shop", shop)?;
    let item = pick(&shop.items, "item", item)?;
    Ok((shop, item))
}

fn print_shops(shops: &[Shop]) {
    if shops.is_empty() {
        println!("No shops yet.");
        return;
    }
    for (i, shop) in shops.iter().enumerate() {
        let checked = shop.checked_items().count();
        println!(
            "{:>2}. {} ({}/{} checked)",
            i + 1,
            shop.name,
            checked,
            shop.items.len()
        );
        if shop.is_expanded {
            for (j, item) in shop.items.iter().enumerate() {
                println!("      {}. {}", j + 1, item);
            }
        }
    }
}
