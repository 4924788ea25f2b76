use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing::warn;
use tuffix_core::{BuildConfig, KeywordAction, TuffixError, STATE_DIR_ENV};
use tuffix_installer::{
    host_package_manager, AssumeYes, Confirmer, MarkEngine, MarkFailure, MarkOutcome,
    RootPrivilege, StateLayout, StateStore,
};
use tuffix_registry::{CustomKeywordCatalog, KeywordRegistry};

use crate::completion::write_completions_script;
use crate::confirm::TerminalConfirmer;
use crate::render::{
    current_output_style, format_describe_line, format_installed_lines, format_keyword_line,
    format_keyword_lines, print_lines, render_section_header, render_status_line, OutputStyle,
};
use crate::status::{format_status_lines, StatusReport};
use crate::{Cli, Commands};

pub(crate) const EXIT_FAILURE: u8 = 1;
pub(crate) const EXIT_USAGE: u8 = 2;
pub(crate) const EXIT_CANCELLED: u8 = 130;

pub(crate) fn run_cli(cli: Cli) -> Result<ExitCode> {
    let env_state_dir = std::env::var(STATE_DIR_ENV).ok();
    let config = resolve_config(
        cli.config.as_deref(),
        env_state_dir.as_deref(),
        cli.state_dir.as_deref(),
    )?;
    let style = current_output_style();
    let layout = StateLayout::new(&config.state_dir);
    let store = StateStore::new(layout.clone());

    match cli.command {
        Commands::Init => {
            let state = store.initialize(&config)?;
            println!(
                "{}",
                render_status_line(
                    style,
                    "ok",
                    &format!("Tuffix init succeeded (state version {})", state.version)
                )
            );
        }
        Commands::Add { names } => {
            let mut registry = open_registry(&layout)?;
            return run_mark(
                &config,
                &mut registry,
                &store,
                MarkRequest::Keywords(KeywordAction::Install, &names),
                cli.yes,
                style,
            );
        }
        Commands::Remove { names } => {
            let mut registry = open_registry(&layout)?;
            return run_mark(
                &config,
                &mut registry,
                &store,
                MarkRequest::Keywords(KeywordAction::Remove, &names),
                cli.yes,
                style,
            );
        }
        Commands::Custom { paths } => {
            let mut registry = open_registry(&layout)?;
            return run_mark(
                &config,
                &mut registry,
                &store,
                MarkRequest::Custom(&paths),
                cli.yes,
                style,
            );
        }
        Commands::Describe { name } => {
            let mut registry = open_registry(&layout)?;
            let keyword = registry
                .resolve(&name)?
                .ok_or_else(|| TuffixError::UnknownKeyword(name.clone()))?;
            println!("{}", format_describe_line(keyword.as_ref()));
        }
        Commands::List => {
            let mut registry = open_registry(&layout)?;
            println!("{}", render_section_header(style, "tuffix list of keywords"));
            print_lines(&format_keyword_lines(registry.all()));

            let custom = custom_keyword_lines(&mut registry);
            if !custom.is_empty() {
                println!("{}", render_section_header(style, "custom keywords"));
                print_lines(&custom);
            }
        }
        Commands::Installed => {
            let state = store.read()?;
            print_lines(&format_installed_lines(&state.installed, style));
        }
        Commands::Status => {
            let report = StatusReport::collect(&config, &store)?;
            print_lines(&format_status_lines(&report, style));
        }
        Commands::Completions { shell } => {
            write_completions_script(shell, &mut std::io::stdout())?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

pub(crate) fn resolve_config(
    explicit: Option<&Path>,
    env_state_dir: Option<&str>,
    flag_state_dir: Option<&Path>,
) -> Result<BuildConfig> {
    let config = BuildConfig::load(explicit).context("failed loading tuffix configuration")?;
    Ok(config.with_state_dir_overrides(env_state_dir, flag_state_dir))
}

fn open_registry(layout: &StateLayout) -> Result<KeywordRegistry> {
    let registry = KeywordRegistry::builtin().context("built-in keyword catalog is invalid")?;
    Ok(registry.with_custom_catalog(CustomKeywordCatalog::open(layout.custom_keywords_dir())))
}

/// Lines for stored custom keywords; unreadable definitions are skipped with a warning.
fn custom_keyword_lines(registry: &mut KeywordRegistry) -> Vec<String> {
    let names = match registry.custom_catalog().map(CustomKeywordCatalog::names) {
        Some(Ok(names)) => names,
        Some(Err(err)) => {
            warn!(error = %err, "could not read the custom keyword catalog");
            return Vec::new();
        }
        None => return Vec::new(),
    };

    let mut lines = Vec::with_capacity(names.len());
    for name in names {
        match registry.resolve(&name) {
            Ok(Some(keyword)) => lines.push(format_keyword_line(keyword.as_ref())),
            Ok(None) => {}
            Err(err) => warn!(keyword = %name, error = %err, "skipping custom keyword"),
        }
    }
    lines
}

/// What a package-changing command asks the mark engine to do.
enum MarkRequest<'a> {
    Keywords(KeywordAction, &'a [String]),
    /// Import the definition files, then install them.
    Custom(&'a [PathBuf]),
}

fn run_mark(
    config: &BuildConfig,
    registry: &mut KeywordRegistry,
    store: &StateStore,
    request: MarkRequest<'_>,
    assume_yes: bool,
    style: OutputStyle,
) -> Result<ExitCode> {
    let mut packages = host_package_manager();
    let mut assume = AssumeYes;
    let mut prompt = TerminalConfirmer::default();
    let confirmer: &mut dyn Confirmer = if assume_yes {
        &mut assume
    } else {
        &mut prompt
    };

    let mut engine = MarkEngine::new(
        config,
        registry,
        store,
        &mut packages,
        confirmer,
        &RootPrivilege,
    );
    let result = match request {
        MarkRequest::Keywords(action, names) => engine.mark(action, names),
        MarkRequest::Custom(paths) => engine.install_custom(paths),
    };
    match result {
        Ok(MarkOutcome::Completed { action, keywords }) => {
            print_lines(&format_mark_completed_lines(action, &keywords, style));
            Ok(ExitCode::SUCCESS)
        }
        Ok(MarkOutcome::Cancelled) => {
            println!(
                "{}",
                render_status_line(style, "warn", "cancelled; nothing was changed")
            );
            Ok(ExitCode::from(EXIT_CANCELLED))
        }
        Err(failure) => {
            for line in format_mark_failure_notes(&failure, style) {
                eprintln!("{line}");
            }
            Err(failure.into())
        }
    }
}

pub(crate) fn format_mark_completed_lines(
    action: KeywordAction,
    keywords: &[String],
    style: OutputStyle,
) -> Vec<String> {
    if keywords.is_empty() {
        return vec![render_status_line(
            style,
            "info",
            &format!("no keywords to {action}"),
        )];
    }
    keywords
        .iter()
        .map(|name| {
            render_status_line(
                style,
                "ok",
                &format!("successfully {} {name}", action.past()),
            )
        })
        .collect()
}

/// Extra context printed before a mark failure itself.
pub(crate) fn format_mark_failure_notes(failure: &MarkFailure, style: OutputStyle) -> Vec<String> {
    let mut notes = Vec::new();
    if failure.is_partial() {
        notes.push(render_status_line(
            style,
            "warn",
            &format!(
                "already {} before the failure: {}",
                failure.action.past(),
                failure.committed.join(", ")
            ),
        ));
    }
    if failure.error.is_retryable() {
        notes.push(render_status_line(
            style,
            "warn",
            "the package manager was busy; re-run the same command",
        ));
    }
    notes
}

pub(crate) fn exit_code_for_error(err: &anyhow::Error) -> u8 {
    let usage = err.chain().any(|cause| {
        cause
            .downcast_ref::<TuffixError>()
            .is_some_and(TuffixError::is_usage)
    });
    if usage {
        EXIT_USAGE
    } else {
        EXIT_FAILURE
    }
}
