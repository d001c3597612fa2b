mod args;

pub use args::{
    AuditArgs, CliArgs, CommandKind, ConfigArgs, DescribeArgs, DiffArgs, EnvsArgs, HistoryArgs,
    InitArgs, InspectArgs, ObjectsArgs, OutputFlags, PlanArgs, RunArgs, build_cli, parse_matches,
};

pub fn parse() -> CliArgs {
    args::parse_args()
}
