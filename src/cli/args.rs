use std::path::PathBuf;

use clap::{Arg, ArgAction, ArgMatches, Command, ValueHint};

#[derive(Debug, Clone)]
pub struct OutputFlags {
    pub json: bool,
    pub markdown: bool,
    pub pretty: bool,
}

#[derive(Debug, Clone)]
pub struct CliArgs {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
    pub output: OutputFlags,
    pub verbose: u8,
    pub quiet: bool,
    pub command: CommandKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    Help { all: bool, command: Option<String> },
    Envs(EnvsArgs),
    Objects(ObjectsArgs),
    Describe(DescribeArgs),
    Plan(PlanArgs),
    Diff(DiffArgs),
    Apply(RunArgs),
    Rollback(RunArgs),
    Inspect(InspectArgs),
    Audit(AuditArgs),
    History(HistoryArgs),
    Init(InitArgs),
    Config(ConfigArgs),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvsArgs {
    pub check: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectsArgs {
    pub env: String,
    pub object_type: Option<String>,
    pub schema: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescribeArgs {
    pub env: String,
    pub object: String,
    pub object_type: Option<String>,
    pub sample: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanArgs {
    pub env: String,
    pub file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffArgs {
    pub from: String,
    pub to: String,
    pub objects: Vec<String>,
    pub no_order: bool,
}

/// Shared by `apply` and `rollback`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunArgs {
    pub env: String,
    pub file: PathBuf,
    pub rollback_file: Option<PathBuf>,
    pub dry_run: bool,
    pub auto_create_schemas: bool,
    pub user: Option<String>,
    pub correlation_id: Option<String>,
    pub objects: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectArgs {
    pub file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditArgs {
    pub db: bool,
    pub env: Option<String>,
    pub action: Option<String>,
    pub since: Option<String>,
    pub until: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryArgs {
    pub object: Option<String>,
    pub commit: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitArgs {
    pub path: Option<PathBuf>,
    pub force: bool,
    pub env: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigArgs;

pub fn build_cli(show_all: bool) -> Command {
    let mut cmd = Command::new("ddlplan")
        .about("Plan, order and apply SQL Server schema changes across environments")
        .version(env!("CARGO_PKG_VERSION"))
        .arg_required_else_help(true)
        .disable_help_subcommand(true)
        .subcommand_value_name("COMMAND");

    cmd = add_global_args(cmd);

    cmd = cmd.subcommand(command_help());

    cmd = cmd.subcommand(command_envs(show_all));
    cmd = cmd.subcommand(command_objects(show_all));
    cmd = cmd.subcommand(command_describe(show_all));
    cmd = cmd.subcommand(command_plan(show_all));
    cmd = cmd.subcommand(command_diff(show_all));
    cmd = cmd.subcommand(command_apply(show_all));
    cmd = cmd.subcommand(command_rollback(show_all));
    cmd = cmd.subcommand(command_inspect(show_all));
    cmd = cmd.subcommand(command_init(show_all));
    cmd = cmd.subcommand(command_config(show_all));

    cmd = cmd.subcommand(command_audit(show_all));
    cmd = cmd.subcommand(command_history(show_all));

    cmd
}

pub fn parse_args() -> CliArgs {
    let matches = build_cli(false).get_matches();
    parse_matches(&matches)
}

fn add_global_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("config")
            .long("config")
            .value_name("PATH")
            .value_hint(ValueHint::FilePath)
            .global(true)
            .help("Override config file location"),
    )
    .arg(
        Arg::new("env-file")
            .long("env-file")
            .value_name("PATH")
            .value_hint(ValueHint::FilePath)
            .global(true)
            .help("Load environment variables from file (default: .env)"),
    )
    .arg(
        Arg::new("json")
            .long("json")
            .action(ArgAction::SetTrue)
            .global(true)
            .help("Output as JSON"),
    )
    .arg(
        Arg::new("markdown")
            .long("markdown")
            .action(ArgAction::SetTrue)
            .global(true)
            .help("Force markdown table output"),
    )
    .arg(
        Arg::new("pretty")
            .long("pretty")
            .action(ArgAction::SetTrue)
            .global(true)
            .help("Force pretty-printed table output"),
    )
    .arg(
        Arg::new("verbose")
            .short('v')
            .long("verbose")
            .action(ArgAction::Count)
            .global(true)
            .help("Enable debug logging"),
    )
    .arg(
        Arg::new("quiet")
            .short('q')
            .long("quiet")
            .action(ArgAction::SetTrue)
            .global(true)
            .help("Suppress non-error output"),
    )
}

fn command_help() -> Command {
    Command::new("help")
        .about("Show help for commands")
        .arg(
            Arg::new("all")
                .long("all")
                .action(ArgAction::SetTrue)
                .help("Show all commands, including advanced ones"),
        )
        .arg(Arg::new("command").value_name("COMMAND"))
}

fn command_core(
    name: &'static str,
    about: &'static str,
    aliases: &'static [&'static str],
    _show_all: bool,
) -> Command {
    let mut cmd = Command::new(name).about(about);
    for alias in aliases {
        cmd = cmd.visible_alias(*alias);
    }
    cmd
}

fn command_advanced(
    name: &'static str,
    about: &'static str,
    aliases: &'static [&'static str],
    show_all: bool,
) -> Command {
    let mut cmd = Command::new(name).about(about);
    for alias in aliases {
        cmd = cmd.visible_alias(*alias);
    }
    if !show_all {
        cmd = cmd.hide(true);
    }
    cmd
}

fn env_arg() -> Arg {
    Arg::new("env")
        .long("env")
        .short('e')
        .value_name("ENV")
        .required(true)
        .help("Target environment (DEV, TEST, PROD, ...)")
}

fn file_arg(help: &'static str) -> Arg {
    Arg::new("file")
        .long("file")
        .short('f')
        .value_name("PATH")
        .value_hint(ValueHint::FilePath)
        .required(true)
        .help(help)
}

fn type_arg() -> Arg {
    Arg::new("type")
        .long("type")
        .value_name("TYPE")
        .value_parser(["table", "view", "procedure", "function", "trigger", "index"])
        .ignore_case(true)
}

fn limit_arg() -> Arg {
    Arg::new("limit")
        .long("limit")
        .value_name("n")
        .value_parser(clap::value_parser!(usize))
}

fn command_envs(show_all: bool) -> Command {
    command_core("envs", "List configured environments", &["environments"], show_all).arg(
        Arg::new("check")
            .long("check")
            .action(ArgAction::SetTrue)
            .help("Connect to each environment and report reachability"),
    )
}

fn command_objects(show_all: bool) -> Command {
    command_core(
        "objects",
        "List tables, views, procedures, functions, triggers and indexes",
        &["ls"],
        show_all,
    )
    .arg(env_arg())
    .arg(type_arg().help("Only list objects of this type"))
    .arg(Arg::new("schema").long("schema").value_name("name"))
}

fn command_describe(show_all: bool) -> Command {
    command_core(
        "describe",
        "Show an object's create script, dependencies and sample rows",
        &["desc"],
        show_all,
    )
    .arg(env_arg())
    .arg(
        Arg::new("object")
            .index(1)
            .required(true)
            .value_name("OBJECT")
            .help("[TYPE:]schema.name"),
    )
    .arg(type_arg().help("Object type when OBJECT carries no prefix"))
    .arg(
        Arg::new("sample")
            .long("sample")
            .value_name("n")
            .value_parser(clap::value_parser!(u32))
            .help("Include the first n rows of a table"),
    )
}

fn command_plan(show_all: bool) -> Command {
    command_core(
        "plan",
        "Plan CREATE/ALTER TABLE statements against an environment",
        &[],
        show_all,
    )
    .arg(env_arg())
    .arg(file_arg("DDL script to plan"))
}

fn command_diff(show_all: bool) -> Command {
    command_core(
        "diff",
        "Plan objects from one environment onto another",
        &["compare"],
        show_all,
    )
    .arg(
        Arg::new("from")
            .long("from")
            .value_name("ENV")
            .required(true)
            .help("Source environment"),
    )
    .arg(
        Arg::new("to")
            .long("to")
            .value_name("ENV")
            .required(true)
            .help("Target environment"),
    )
    .arg(
        Arg::new("objects")
            .index(1)
            .value_name("OBJECT")
            .num_args(1..)
            .required(true)
            .help("[TYPE:]schema.name or INDEX:schema.table.index"),
    )
    .arg(
        Arg::new("no-order")
            .long("no-order")
            .action(ArgAction::SetTrue)
            .help("Keep request order instead of resolving dependencies"),
    )
}

fn run_args(cmd: Command) -> Command {
    cmd.arg(env_arg())
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .action(ArgAction::SetTrue)
                .help("Run inside a transaction that is always rolled back"),
        )
        .arg(
            Arg::new("user")
                .long("user")
                .value_name("NAME")
                .env("DDLPLAN_USER")
                .help("User recorded in the audit log and archive"),
        )
        .arg(
            Arg::new("correlation-id")
                .long("correlation-id")
                .value_name("ID")
                .help("Correlation id recorded in the audit log and archive"),
        )
        .arg(
            Arg::new("object")
                .long("object")
                .value_name("schema.name")
                .action(ArgAction::Append)
                .help("Object touched by the script (repeatable)"),
        )
}

fn command_apply(show_all: bool) -> Command {
    run_args(command_core(
        "apply",
        "Execute an implementation script",
        &[],
        show_all,
    ))
    .arg(file_arg("Implementation script"))
    .arg(
        Arg::new("rollback-file")
            .long("rollback-file")
            .value_name("PATH")
            .value_hint(ValueHint::FilePath)
            .help("Rollback script archived with the implementation"),
    )
    .arg(
        Arg::new("auto-create-schemas")
            .long("auto-create-schemas")
            .action(ArgAction::SetTrue)
            .help("Create missing schemas referenced by the script first"),
    )
}

fn command_rollback(show_all: bool) -> Command {
    run_args(command_core(
        "rollback",
        "Execute a rollback script",
        &[],
        show_all,
    ))
    .arg(file_arg("Rollback script"))
}

fn command_inspect(show_all: bool) -> Command {
    command_core(
        "inspect",
        "Show how a script splits into batches and statements (offline)",
        &[],
        show_all,
    )
    .arg(file_arg("Script to inspect"))
}

fn command_init(show_all: bool) -> Command {
    command_core("init", "Create config file", &[], show_all)
        .arg(
            Arg::new("path")
                .long("path")
                .value_name("path")
                .value_hint(ValueHint::FilePath),
        )
        .arg(Arg::new("force").long("force").action(ArgAction::SetTrue))
        .arg(
            Arg::new("env")
                .long("env")
                .value_name("name")
                .help("Name of the first environment (default: DEV)"),
        )
}

fn command_config(show_all: bool) -> Command {
    command_core("config", "Display resolved config", &[], show_all)
}

fn command_audit(show_all: bool) -> Command {
    command_advanced("audit", "Read the apply/rollback audit log", &[], show_all)
        .arg(
            Arg::new("db")
                .long("db")
                .action(ArgAction::SetTrue)
                .requires("env")
                .help("Read dbo.ddl_audit instead of the log file"),
        )
        .arg(Arg::new("env").long("env").value_name("ENV"))
        .arg(Arg::new("action").long("action").value_name("apply|rollback"))
        .arg(Arg::new("since").long("since").value_name("TIMESTAMP"))
        .arg(Arg::new("until").long("until").value_name("TIMESTAMP"))
        .arg(limit_arg())
}

fn command_history(show_all: bool) -> Command {
    command_advanced("history", "Archived script history", &["log"], show_all)
        .arg(
            Arg::new("object")
                .long("object")
                .value_name("schema.name")
                .help("Only commits touching this object"),
        )
        .arg(
            Arg::new("commit")
                .long("commit")
                .value_name("HASH")
                .conflicts_with("object")
                .help("Show one commit with its files and diff"),
        )
        .arg(limit_arg())
}

fn required(matches: &ArgMatches, id: &str) -> String {
    matches.get_one::<String>(id).cloned().unwrap_or_default()
}

fn many(matches: &ArgMatches, id: &str) -> Vec<String> {
    matches
        .get_many::<String>(id)
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}

fn parse_run(matches: &ArgMatches) -> RunArgs {
    RunArgs {
        env: required(matches, "env"),
        file: PathBuf::from(required(matches, "file")),
        rollback_file: matches
            .try_get_one::<String>("rollback-file")
            .ok()
            .flatten()
            .map(PathBuf::from),
        dry_run: matches.get_flag("dry-run"),
        auto_create_schemas: matches
            .try_get_one::<bool>("auto-create-schemas")
            .ok()
            .flatten()
            .copied()
            .unwrap_or(false),
        user: matches.get_one::<String>("user").cloned(),
        correlation_id: matches.get_one::<String>("correlation-id").cloned(),
        objects: many(matches, "object"),
    }
}

pub fn parse_matches(matches: &ArgMatches) -> CliArgs {
    let config_path = matches.get_one::<String>("config").map(PathBuf::from);
    let env_file = matches.get_one::<String>("env-file").map(PathBuf::from);
    let output = OutputFlags {
        json: matches.get_flag("json"),
        markdown: matches.get_flag("markdown"),
        pretty: matches.get_flag("pretty"),
    };
    let verbose = matches.get_count("verbose");
    let quiet = matches.get_flag("quiet");

    let command = match matches.subcommand() {
        Some(("help", sub_m)) => CommandKind::Help {
            all: sub_m.get_flag("all"),
            command: sub_m.get_one::<String>("command").cloned(),
        },
        Some(("envs", sub_m)) => CommandKind::Envs(EnvsArgs {
            check: sub_m.get_flag("check"),
        }),
        Some(("objects", sub_m)) => CommandKind::Objects(ObjectsArgs {
            env: required(sub_m, "env"),
            object_type: sub_m.get_one::<String>("type").cloned(),
            schema: sub_m.get_one::<String>("schema").cloned(),
        }),
        Some(("describe", sub_m)) => CommandKind::Describe(DescribeArgs {
            env: required(sub_m, "env"),
            object: required(sub_m, "object"),
            object_type: sub_m.get_one::<String>("type").cloned(),
            sample: sub_m.get_one::<u32>("sample").copied(),
        }),
        Some(("plan", sub_m)) => CommandKind::Plan(PlanArgs {
            env: required(sub_m, "env"),
            file: PathBuf::from(required(sub_m, "file")),
        }),
        Some(("diff", sub_m)) => CommandKind::Diff(DiffArgs {
            from: required(sub_m, "from"),
            to: required(sub_m, "to"),
            objects: many(sub_m, "objects"),
            no_order: sub_m.get_flag("no-order"),
        }),
        Some(("apply", sub_m)) => CommandKind::Apply(parse_run(sub_m)),
        Some(("rollback", sub_m)) => CommandKind::Rollback(parse_run(sub_m)),
        Some(("inspect", sub_m)) => CommandKind::Inspect(InspectArgs {
            file: PathBuf::from(required(sub_m, "file")),
        }),
        Some(("audit", sub_m)) => CommandKind::Audit(AuditArgs {
            db: sub_m.get_flag("db"),
            env: sub_m.get_one::<String>("env").cloned(),
            action: sub_m.get_one::<String>("action").cloned(),
            since: sub_m.get_one::<String>("since").cloned(),
            until: sub_m.get_one::<String>("until").cloned(),
            limit: sub_m.get_one::<usize>("limit").copied(),
        }),
        Some(("history", sub_m)) => CommandKind::History(HistoryArgs {
            object: sub_m.get_one::<String>("object").cloned(),
            commit: sub_m.get_one::<String>("commit").cloned(),
            limit: sub_m.get_one::<usize>("limit").copied(),
        }),
        Some(("init", sub_m)) => CommandKind::Init(InitArgs {
            path: sub_m.get_one::<String>("path").map(PathBuf::from),
            force: sub_m.get_flag("force"),
            env: sub_m.get_one::<String>("env").cloned(),
        }),
        Some(("config", _)) => CommandKind::Config(ConfigArgs),
        _ => CommandKind::Help {
            all: false,
            command: None,
        },
    };

    CliArgs {
        config_path,
        env_file,
        output,
        verbose,
        quiet,
        command,
    }
}
