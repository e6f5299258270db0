//! CLI command implementations.
//!
//! | Module  | Commands handled                                     |
//! |---------|------------------------------------------------------|
//! | `auth`  | `Login`, `Callback`, `Whoami`, `Logout`              |
//! | `tasks` | `Tasks`, `Task`, `Create`, `Move`, `AssignBranch`, `Stats`, `Upload` |

pub mod auth;
pub mod tasks;

pub use auth::{cmd_callback, cmd_login, cmd_logout, cmd_whoami, restore_session};
pub use tasks::{
    cmd_assign_branch, cmd_create, cmd_move, cmd_stats, cmd_task, cmd_tasks, cmd_upload,
};
