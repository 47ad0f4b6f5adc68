//! Stepwise CLI - process checklists, template forking and calendar scheduling.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use clap::Parser;
use std::process;
use stepwise::cli::{
    Cli, Commands, ConfigCommands, DirCommands, EventCommands, ProcessCommands, StepCommands,
    SubstepCommands, SystemCommands,
};
use stepwise::commands::{self, Context, Location, Output};
use stepwise::config::{ConfigOverrides, OutputFormat, ResolvedConfig, resolve_config};
use tracing_subscriber::EnvFilter;

/// Log filter, e.g. `SW_LOG=stepwise=debug`.
const LOG_ENV: &str = "SW_LOG";

/// `json` switches log lines on stderr to JSON.
const LOG_FORMAT_ENV: &str = "SW_LOG_FORMAT";

fn main() {
    let cli = Cli::parse();
    init_logging();

    let location = Location::new(cli.db_path.clone());
    let as_of = resolve_as_of(cli.as_of);

    let mut overrides = ConfigOverrides::new();
    if cli.human_readable {
        overrides = overrides.with_output_format(OutputFormat::Human);
    }
    let config = match location
        .config_path()
        .and_then(|path| resolve_config(&path, &overrides))
    {
        Ok(config) => config,
        Err(e) => fail(&e, cli.human_readable),
    };
    let human = config.output_format() == OutputFormat::Human;

    tracing::debug!(command = ?cli.command, %as_of, "running command");
    if let Err(e) = run_command(cli.command, &location, config, as_of, human) {
        fail(&e, human);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// `--as-of` is taken at noon UTC; otherwise the current time.
fn resolve_as_of(date: Option<NaiveDate>) -> DateTime<Utc> {
    match date {
        Some(date) => (date.and_time(NaiveTime::MIN) + Duration::hours(12)).and_utc(),
        None => Utc::now(),
    }
}

fn fail(e: &stepwise::Error, human: bool) -> ! {
    if human {
        eprintln!("Error: {}", e);
    } else {
        eprintln!("{}", serde_json::json!({ "error": e.to_string() }));
    }
    process::exit(1);
}

fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}

fn run_command(
    command: Commands,
    location: &Location,
    config: ResolvedConfig,
    as_of: DateTime<Utc>,
    human: bool,
) -> stepwise::Result<()> {
    // Commands that work without an initialized database
    let command = match command {
        Commands::System { command } => {
            match command {
                SystemCommands::Init => output(&commands::system_init(location, as_of)?, human),
                SystemCommands::Info => output(&commands::system_info(location)?, human),
            }
            return Ok(());
        }
        Commands::Config { command } => {
            match command {
                ConfigCommands::Get { key } => output(&commands::config_get(&config, &key)?, human),
                ConfigCommands::Set { key, value } => {
                    output(&commands::config_set(location, &key, &value)?, human)
                }
                ConfigCommands::Show => output(&commands::config_show(&config), human),
            }
            return Ok(());
        }
        other => other,
    };

    let ctx = Context::new(location.open()?, config, as_of);

    match command {
        Commands::Dir { command } => match command {
            DirCommands::Create {
                name,
                owner,
                parent,
                description,
                color,
                icon,
            } => {
                let new = commands::NewDirectory {
                    name,
                    owner,
                    parent,
                    description,
                    color,
                    icon,
                };
                output(&commands::dir_create(&ctx, new)?, human);
            }
            DirCommands::List { owner } => output(&commands::dir_list(&ctx, &owner)?, human),
            DirCommands::Move { id, parent } => output(&commands::dir_move(&ctx, id, parent)?, human),
            DirCommands::Delete { id } => output(&commands::dir_delete(&ctx, id)?, human),
        },

        Commands::Process { command } => match command {
            ProcessCommands::Create {
                title,
                owner,
                template,
                dir,
                description,
                category,
            } => {
                let new = commands::NewProcess {
                    title,
                    owner,
                    template,
                    directory_id: dir,
                    description,
                    category,
                };
                output(&commands::process_create(&ctx, new)?, human);
            }
            ProcessCommands::Show { id } => output(&commands::process_show(&ctx, id)?, human),
            ProcessCommands::List {
                owner,
                templates,
                plain,
            } => {
                let is_template = match (templates, plain) {
                    (true, _) => Some(true),
                    (_, true) => Some(false),
                    _ => None,
                };
                output(&commands::process_list(&ctx, owner.as_deref(), is_template)?, human);
            }
            ProcessCommands::Move { id, dir } => {
                output(&commands::process_move(&ctx, id, dir)?, human)
            }
            ProcessCommands::Favorite { id, off } => {
                output(&commands::process_favorite(&ctx, id, !off)?, human)
            }
            ProcessCommands::Delete { id } => output(&commands::process_delete(&ctx, id)?, human),
        },

        Commands::Step { command } => match command {
            StepCommands::Add {
                process_id,
                content,
                due,
            } => output(&commands::step_add(&ctx, process_id, &content, due)?, human),
            StepCommands::Complete { id } => {
                output(&commands::step_set_completed(&ctx, id, true, false)?, human)
            }
            StepCommands::Uncomplete { id, cascade } => {
                output(&commands::step_set_completed(&ctx, id, false, cascade)?, human)
            }
            StepCommands::Move { id, position } => {
                output(&commands::step_move(&ctx, id, position)?, human)
            }
            StepCommands::Delete { id } => output(&commands::step_delete(&ctx, id)?, human),
        },

        Commands::Substep { command } => match command {
            SubstepCommands::Add {
                step_id,
                content,
                due,
            } => output(&commands::substep_add(&ctx, step_id, &content, due)?, human),
            SubstepCommands::Complete { id, undo } => {
                output(&commands::substep_set_completed(&ctx, id, !undo)?, human)
            }
            SubstepCommands::Move { id, position } => {
                output(&commands::substep_move(&ctx, id, position)?, human)
            }
            SubstepCommands::Delete { id } => output(&commands::substep_delete(&ctx, id)?, human),
        },

        Commands::Fork { template_id, owner } => {
            output(&commands::fork(&ctx, template_id, &owner)?, human)
        }

        Commands::Reconcile { process_id, all } => {
            let scope = if all { None } else { process_id };
            output(&commands::reconcile(&ctx, scope)?, human);
        }

        Commands::Schedule {
            owner,
            role,
            from,
            to,
            pool,
            seed,
        } => {
            let args = commands::ScheduleArgs {
                owner,
                role,
                from,
                to,
                pool,
                seed,
            };
            output(&commands::schedule(&ctx, args)?, human);
        }

        Commands::Event { command } => match command {
            EventCommands::List { owner, from, to } => {
                output(&commands::event_list(&ctx, &owner, from, to)?, human)
            }
            EventCommands::Repair { owner } => {
                output(&commands::event_repair(&ctx, owner.as_deref())?, human)
            }
            EventCommands::Relate { owner, ratio, seed } => {
                output(&commands::event_relate(&ctx, &owner, ratio, seed)?, human)
            }
            EventCommands::Refresh { owner } => {
                output(&commands::event_refresh(&ctx, &owner)?, human)
            }
        },

        Commands::Synthesize { owner, role, seed } => {
            let report = commands::synthesize(&ctx, &owner, role.as_deref(), seed)?;
            output(&report, human);
            if !report.succeeded() {
                // The report is already printed; signal the partial run.
                process::exit(1);
            }
        }

        Commands::Assist {
            process_id,
            message,
            apply,
            offline,
        } => output(
            &commands::assist(&ctx, process_id, &message, apply, offline)?,
            human,
        ),

        Commands::System { .. } | Commands::Config { .. } => {}
    }

    Ok(())
}
