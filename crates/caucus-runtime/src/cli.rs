//! CLI definition using clap derive.

use std::path::PathBuf;

use caucus_core::{AttendanceEntryType, Procedure};
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "caucus", about = "live committee session client")]
pub struct Cli {
    /// Session config file (TOML)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Resource API base URL
    #[arg(long, global = true, env = "CAUCUS_API_URL")]
    pub api_url: Option<String>,

    /// Session transport base URL (ws:// or wss://)
    #[arg(long, global = true, env = "CAUCUS_WS_URL")]
    pub ws_url: Option<String>,

    /// Administrator access token
    #[arg(long, global = true, env = "CAUCUS_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Follow a committee session live
    Watch(WatchOpts),
    /// Switch the committee's active procedure (administrator)
    Poll(PollOpts),
    /// Submit attendance for a delegation
    Attend(AttendOpts),
    /// Set the committee's delegation roster (administrator)
    Roster(RosterOpts),
    /// List all delegations
    Delegations,
}

#[derive(clap::Args)]
pub struct WatchOpts {
    pub committee_id: u32,

    /// Follow this delegation's attendance
    #[arg(long, short = 'd')]
    pub delegation: Option<u32>,

    /// Display name for the administrator session
    #[arg(long, short = 'u')]
    pub user: Option<String>,
}

#[derive(clap::Args)]
pub struct PollOpts {
    pub committee_id: u32,

    #[arg(value_enum)]
    pub procedure: ProcedureArg,
}

#[derive(clap::Args)]
pub struct AttendOpts {
    pub committee_id: u32,

    pub delegation_id: u32,

    #[arg(value_enum)]
    pub entry: EntryArg,
}

#[derive(clap::Args)]
pub struct RosterOpts {
    pub committee_id: u32,

    /// Every delegation that should sit on the committee
    #[arg(required = true, num_args = 1..)]
    pub delegation_ids: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProcedureArg {
    None,
    Voting,
    Attendance,
}

impl From<ProcedureArg> for Procedure {
    fn from(arg: ProcedureArg) -> Self {
        match arg {
            ProcedureArg::None => Procedure::None,
            ProcedureArg::Voting => Procedure::Voting,
            ProcedureArg::Attendance => Procedure::Attendance,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EntryArg {
    /// Present
    Present,
    /// Present and voting
    Voting,
}

impl From<EntryArg> for AttendanceEntryType {
    fn from(arg: EntryArg) -> Self {
        match arg {
            EntryArg::Present => AttendanceEntryType::Present,
            EntryArg::Voting => AttendanceEntryType::PresentAndVoting,
        }
    }
}
