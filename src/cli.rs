use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "mastersync",
    version,
    about = "Stage and apply bulk edits to an OurGroceries master list"
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "State directory (defaults to MASTERSYNC_HOME or ~/.mastersync)"
    )]
    pub home: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        value_name = "ID",
        help = "Session identifier (defaults to the last login)"
    )]
    pub session_id: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Login(Login),
    Logout,
    Lists,
    Show,
    #[command(subcommand)]
    Filter(FilterCommand),
    #[command(subcommand)]
    Stage(StageCommand),
    Unstage(Unstage),
    Pending,
    Apply(Apply),
    #[command(subcommand)]
    Item(ItemCommand),
    #[command(subcommand)]
    Category(CategoryCommand),
}

#[derive(Args, Debug)]
pub struct Login {
    #[arg(long)]
    pub email: String,
    #[arg(long, help = "Password (or set MASTERSYNC_PASSWORD)")]
    pub password: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum FilterCommand {
    /// Toggle a category filter.
    Category(FilterCategory),
    /// Toggle showing only items with staged changes.
    Pending,
    Clear,
}

#[derive(Args, Debug)]
pub struct FilterCategory {
    pub id: String,
}

#[derive(Subcommand, Debug)]
pub enum StageCommand {
    /// Toggle a staged move; staging the same move again clears it.
    Move(StageMove),
    /// Toggle a staged delete.
    Delete(StageDelete),
}

#[derive(Args, Debug)]
pub struct StageMove {
    pub item_id: String,
    #[arg(help = "Target category id (\"uncategorized\" for none)")]
    pub category_id: String,
}

#[derive(Args, Debug)]
pub struct StageDelete {
    pub item_id: String,
}

#[derive(Args, Debug)]
pub struct Unstage {
    #[arg(required = true, num_args = 1..)]
    pub item_ids: Vec<String>,
}

#[derive(Args, Debug)]
pub struct Apply {
    #[arg(long, help = "Commit the changes instead of only printing the plan")]
    pub yes: bool,
    #[arg(long = "skip", value_name = "ITEM_ID", help = "Drop an item's step before commit")]
    pub skip: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum ItemCommand {
    Rename(ItemRename),
}

#[derive(Args, Debug)]
pub struct ItemRename {
    pub item_id: String,
    pub name: String,
}

#[derive(Subcommand, Debug)]
pub enum CategoryCommand {
    Create(CategoryCreate),
    Rename(CategoryRename),
    Delete(CategoryDelete),
    /// Move SOURCE onto TARGET's position.
    Reorder(CategoryReorder),
}

#[derive(Args, Debug)]
pub struct CategoryCreate {
    pub name: String,
}

#[derive(Args, Debug)]
pub struct CategoryRename {
    pub category_id: String,
    pub name: String,
}

#[derive(Args, Debug)]
pub struct CategoryDelete {
    pub category_id: String,
}

#[derive(Args, Debug)]
pub struct CategoryReorder {
    pub source_id: String,
    pub target_id: String,
}
