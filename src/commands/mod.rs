mod apply;
mod audit;
mod common;
mod config;
mod describe;
mod diff;
mod envs;
mod help;
mod history;
mod init;
mod inspect;
mod objects;
mod plan;

use anyhow::Result;

use crate::cli::{CliArgs, CommandKind};
use crate::execute::ApplyAction;

pub fn dispatch(args: &CliArgs) -> Result<()> {
    match &args.command {
        CommandKind::Help { all, command } => help::run(*all, command.as_deref()),
        CommandKind::Envs(cmd) => envs::run(args, cmd),
        CommandKind::Objects(cmd) => objects::run(args, cmd),
        CommandKind::Describe(cmd) => describe::run(args, cmd),
        CommandKind::Plan(cmd) => plan::run(args, cmd),
        CommandKind::Diff(cmd) => diff::run(args, cmd),
        CommandKind::Apply(cmd) => apply::run(args, cmd, ApplyAction::Apply),
        CommandKind::Rollback(cmd) => apply::run(args, cmd, ApplyAction::Rollback),
        CommandKind::Inspect(cmd) => inspect::run(args, cmd),
        CommandKind::Audit(cmd) => audit::run(args, cmd),
        CommandKind::History(cmd) => history::run(args, cmd),
        CommandKind::Init(cmd) => init::run(args, cmd),
        CommandKind::Config(_) => config::run(args),
    }
}
