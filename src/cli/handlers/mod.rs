mod init;
pub use init::cmd_init;

use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use tracing::warn;

use crate::cli::commands::*;
use crate::cli::output::*;
use crate::host::{SettingsStore, Workbench};
use crate::io::lock::StateLock;
use crate::io::session::{SessionHost, read_session, write_session};
use crate::io::settings_io::{FileSettings, SettingsError};
use crate::io::watcher::{FocusTracker, SessionWatcher};
use crate::io::workspace::Paths;
use crate::model::document::{Document, language_for_path};
use crate::model::view::ViewId;
use crate::parse::{folding_ranges, locate};
use crate::sync::{SyncConfig, SyncState, Synchronizer, ViewOutcome};

type CmdResult = Result<(), Box<dyn std::error::Error>>;

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn dispatch(cli: Cli) -> CmdResult {
    let json = cli.json;
    let start = match &cli.workspace_dir {
        Some(dir) => fs::canonicalize(dir)
            .map_err(|e| format!("cannot resolve -C path '{}': {}", dir, e))?,
        None => std::env::current_dir()?,
    };

    match cli.command {
        Commands::Init(args) => cmd_init(&start, args),
        Commands::Toggle => cmd_toggle(&start, json),
        Commands::Status => cmd_status(&start, json),
        Commands::Locate(args) => cmd_locate(&start, args, json),
        Commands::Ranges(args) => cmd_ranges(&start, args, json),
        Commands::Open(args) => cmd_open(&start, args, json),
        Commands::Focus(args) => cmd_focus(&start, args, json),
        Commands::Close(args) => cmd_close(&start, args, json),
        Commands::Views => cmd_views(&start, json),
        Commands::Watch(args) => cmd_watch(&start, args),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Everything a command needs to build a synchronizer.
struct Context {
    paths: Paths,
    /// Base for relative session paths. Outside a workspace this is empty,
    /// so opened files are stored with absolute paths.
    base: PathBuf,
    settings: FileSettings,
    config: SyncConfig,
    /// Whether views opened or focused from outside get the flag applied
    apply_on_open: bool,
}

fn load_context(start: &Path) -> Result<Context, SettingsError> {
    let paths = Paths::resolve(start);
    let settings = FileSettings::from_paths(&paths);
    let loaded = settings.load()?;
    let config = SyncConfig::from_settings(&loaded)?;
    let base = paths.workspace.clone().unwrap_or_default();
    Ok(Context {
        paths,
        base,
        settings,
        config,
        apply_on_open: loaded.annotations.apply_on_open,
    })
}

impl Context {
    fn session_host(&self) -> Result<SessionHost, Box<dyn std::error::Error>> {
        let state = read_session(&self.paths.session_file())?;
        Ok(SessionHost::new(self.base.clone(), state))
    }

    fn save_session(&self, host: &SessionHost) -> Result<(), Box<dyn std::error::Error>> {
        write_session(&self.paths.session_file(), &host.state())?;
        Ok(())
    }
}

/// Run a future to completion on a single-threaded runtime.
fn block_on<F: Future>(fut: F) -> Result<F::Output, std::io::Error> {
    let rt = tokio::runtime::Builder::new_current_thread().build()?;
    Ok(rt.block_on(fut))
}

fn resolve_file(start: &Path, file: &str) -> Result<PathBuf, String> {
    let path = start.join(file);
    fs::canonicalize(&path).map_err(|e| format!("cannot open '{}': {}", file, e))
}

fn read_document(start: &Path, file: &str) -> Result<Document, Box<dyn std::error::Error>> {
    let path = resolve_file(start, file)?;
    let text = fs::read_to_string(&path)?;
    Ok(Document::from_text(file, language_for_path(&path), &text))
}

/// Focus `view` and deliver the resulting activation to the synchronizer.
async fn activate(
    ctx: &Context,
    host: &SessionHost,
    view: &ViewId,
) -> Result<Option<ViewOutcome>, crate::host::HostError> {
    let sync = Synchronizer::new(host, &ctx.settings, ctx.config.clone());
    sync.initialize().await;
    host.focus_view(view).await?;
    Ok(sync.on_view_activated(view).await)
}

fn print_activation(view: &ViewId, outcome: Option<&ViewOutcome>, json: bool) -> CmdResult {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&activation_to_json(view.as_str(), outcome))?
        );
    } else {
        println!("{}", format_activation(view.as_str(), outcome));
    }
    Ok(())
}

/// Report a view that was opened or focused with `apply_on_open` off.
fn print_unapplied(view: &ViewId, json: bool) -> CmdResult {
    if json {
        println!("{}", serde_json::to_string_pretty(&unapplied_to_json(view.as_str()))?);
    } else {
        println!("{}", format_unapplied(view.as_str()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_toggle(start: &Path, json: bool) -> CmdResult {
    let ctx = load_context(start)?;
    let _lock = StateLock::acquire_default(&ctx.paths.state_dir())?;
    let host = ctx.session_host()?;

    let report = block_on(async {
        let sync = Synchronizer::new(&host, &ctx.settings, ctx.config.clone());
        sync.initialize().await;
        sync.toggle().await
    })?;
    ctx.save_session(&host)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", format_report(&report));
    }
    Ok(())
}

fn cmd_status(start: &Path, json: bool) -> CmdResult {
    let ctx = load_context(start)?;
    // initialize may seed the default into the settings file
    let _lock = StateLock::acquire_default(&ctx.paths.state_dir())?;
    let host = ctx.session_host()?;
    let collapsed = block_on(async {
        Synchronizer::new(&host, &ctx.settings, ctx.config.clone())
            .initialize()
            .await
    })?;
    let scope = ctx.settings.preferred_scope();
    let settings_path = ctx.settings.path_for(scope);

    if json {
        let status = StatusJson {
            collapsed,
            scope,
            apply_on_open: ctx.apply_on_open,
            settings_path: settings_path.map(|p| p.display().to_string()),
            workspace: ctx.paths.workspace.as_ref().map(|p| p.display().to_string()),
        };
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("{}", format_status(collapsed, scope, settings_path));
    }
    Ok(())
}

fn cmd_locate(start: &Path, args: FileArgs, json: bool) -> CmdResult {
    let ctx = load_context(start)?;
    let doc = read_document(start, &args.file)?;
    let block = locate(&doc, &ctx.config.markers);

    if json {
        let out = LocateJson {
            path: doc.path.display().to_string(),
            language: doc.language_id.clone(),
            qualifies: ctx.config.target.qualifies(&doc),
            block,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{}", format_block(&doc.path, block));
    }
    Ok(())
}

fn cmd_ranges(start: &Path, args: FileArgs, json: bool) -> CmdResult {
    let ctx = load_context(start)?;
    let doc = read_document(start, &args.file)?;
    let ranges = folding_ranges(&doc, &ctx.config.markers);

    if json {
        let out = RangesJson {
            path: doc.path.display().to_string(),
            ranges,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else if !ranges.is_empty() {
        println!("{}", format_ranges(&ranges));
    }
    Ok(())
}

fn cmd_open(start: &Path, args: OpenArgs, json: bool) -> CmdResult {
    let ctx = load_context(start)?;
    let file = resolve_file(start, &args.file)?;
    let _lock = StateLock::acquire_default(&ctx.paths.state_dir())?;
    let host = ctx.session_host()?;

    let view = host.open(&file, (args.group - 1) as usize);
    if !ctx.apply_on_open {
        block_on(host.focus_view(&view))??;
        ctx.save_session(&host)?;
        return print_unapplied(&view, json);
    }
    let outcome = block_on(activate(&ctx, &host, &view))??;
    ctx.save_session(&host)?;

    print_activation(&view, outcome.as_ref(), json)
}

fn cmd_focus(start: &Path, args: ViewArgs, json: bool) -> CmdResult {
    let ctx = load_context(start)?;
    let _lock = StateLock::acquire_default(&ctx.paths.state_dir())?;
    let host = ctx.session_host()?;

    let view = ViewId::new(args.view);
    let outcome = block_on(activate(&ctx, &host, &view))??;
    ctx.save_session(&host)?;

    print_activation(&view, outcome.as_ref(), json)
}

fn cmd_close(start: &Path, args: ViewArgs, json: bool) -> CmdResult {
    let ctx = load_context(start)?;
    let _lock = StateLock::acquire_default(&ctx.paths.state_dir())?;
    let host = ctx.session_host()?;

    let view = ViewId::new(args.view);
    let before = host.focused_view();
    host.close(&view)?;
    let after = host.focused_view();

    // Closing the focused tab activates its neighbour
    let activated = match after {
        Some(next) if before.as_ref() != Some(&next) => {
            let outcome = block_on(activate(&ctx, &host, &next))??;
            Some((next, outcome))
        }
        _ => None,
    };
    ctx.save_session(&host)?;

    if !json {
        println!("closed {}", view);
    }
    if let Some((next, outcome)) = activated {
        print_activation(&next, outcome.as_ref(), json)?;
    }
    Ok(())
}

fn cmd_views(start: &Path, json: bool) -> CmdResult {
    let ctx = load_context(start)?;
    let host = ctx.session_host()?;
    let state = host.state();

    if json {
        println!("{}", serde_json::to_string_pretty(&views_to_json(&state))?);
    } else {
        println!("{}", format_views(&state));
    }
    Ok(())
}

fn cmd_watch(start: &Path, args: WatchArgs) -> CmdResult {
    let ctx = load_context(start)?;
    let session_file = ctx.paths.session_file();
    fs::create_dir_all(ctx.paths.state_dir())?;

    // The flag is read once; every activation below shares this state.
    let state = Rc::new(SyncState::default());
    let mut tracker = {
        let host = ctx.session_host()?;
        block_on(async {
            Synchronizer::with_state(&host, &ctx.settings, ctx.config.clone(), Rc::clone(&state))
                .initialize()
                .await
        })?;
        FocusTracker::new(host.focused_view())
    };
    if !ctx.apply_on_open {
        warn!("apply_on_open is off; focus changes will be reported but not applied");
    }

    let watcher = SessionWatcher::start(&session_file)?;
    eprintln!("watching {} (ctrl-c to stop)", session_file.display());

    loop {
        if watcher.wait(Duration::from_millis(args.interval_ms)).is_empty() {
            continue;
        }
        match watch_step(&ctx, &mut tracker, &state) {
            Ok(Some(Activation::Applied(view, outcome))) => {
                print_activation(&view, outcome.as_ref(), false)?
            }
            Ok(Some(Activation::Unapplied(view))) => print_unapplied(&view, false)?,
            Ok(None) => {}
            Err(e) => warn!(error = %e, "could not process session change"),
        }
    }
}

/// What one session change amounted to.
#[derive(Debug)]
enum Activation {
    Applied(ViewId, Option<ViewOutcome>),
    Unapplied(ViewId),
}

/// Reload the session after a change and, if focus moved onto a view,
/// deliver the activation.
fn watch_step(
    ctx: &Context,
    tracker: &mut FocusTracker,
    state: &Rc<SyncState>,
) -> Result<Option<Activation>, Box<dyn std::error::Error>> {
    let _lock = StateLock::acquire_default(&ctx.paths.state_dir())?;
    let host = ctx.session_host()?;
    let Some(view) = tracker.observe(host.focused_view()) else {
        return Ok(None);
    };
    if !ctx.apply_on_open {
        return Ok(Some(Activation::Unapplied(view)));
    }

    let outcome = block_on(async {
        Synchronizer::with_state(&host, &ctx.settings, ctx.config.clone(), Rc::clone(state))
            .on_view_activated(&view)
            .await
    })?;
    ctx.save_session(&host)?;
    Ok(Some(Activation::Applied(view, outcome)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::session::SessionState;
    use crate::model::view::FoldAction;
    use crate::parse::span::BlockRange;
    use tempfile::TempDir;

    const MODEL: &str = "# == Schema Info\n#\nclass User\nend\n";

    /// Workspace with two open model views, `v1` focused, collapsed on.
    fn watched_workspace(apply_on_open: bool) -> (TempDir, Context, Rc<SyncState>) {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join(".annofold")).unwrap();
        fs::write(
            root.join(".annofold/settings.toml"),
            format!("[annotations]\ncollapsed = true\napply_on_open = {}\n", apply_on_open),
        )
        .unwrap();
        fs::write(root.join("a.rb"), MODEL).unwrap();
        fs::write(root.join("b.rb"), MODEL).unwrap();

        let mut session = SessionState::default();
        let a = session.open("a.rb".into(), 0);
        session.open("b.rb".into(), 0);
        session.focus(&a);
        write_session(&root.join(".annofold/session.json"), &session).unwrap();

        let ctx = load_context(root).unwrap();
        let state = Rc::new(SyncState::default());
        state.set_collapsed(true);
        (tmp, ctx, state)
    }

    fn refocus(ctx: &Context, view: &str) {
        let path = ctx.paths.session_file();
        let mut session = read_session(&path).unwrap();
        assert!(session.focus(&ViewId::from(view)));
        write_session(&path, &session).unwrap();
    }

    fn folded(ctx: &Context, view: &str) -> Vec<BlockRange> {
        let session = read_session(&ctx.paths.session_file()).unwrap();
        session.view(&ViewId::from(view)).unwrap().folded.clone()
    }

    #[test]
    fn status_waits_for_the_state_lock() {
        let (tmp, ctx, _state) = watched_workspace(true);
        let held = StateLock::acquire_default(&ctx.paths.state_dir()).unwrap();
        let releaser = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(300));
            drop(held);
        });

        let started = std::time::Instant::now();
        cmd_status(tmp.path(), true).unwrap();
        assert!(started.elapsed() >= Duration::from_millis(250));
        releaser.join().unwrap();
    }

    #[test]
    fn rewrite_with_same_focus_applies_nothing() {
        let (_tmp, ctx, state) = watched_workspace(true);
        let mut tracker = FocusTracker::new(Some("v1".into()));

        refocus(&ctx, "v1");
        assert!(watch_step(&ctx, &mut tracker, &state).unwrap().is_none());
        assert!(folded(&ctx, "v1").is_empty());
    }

    #[test]
    fn focus_change_is_applied() {
        let (_tmp, ctx, state) = watched_workspace(true);
        let mut tracker = FocusTracker::new(Some("v1".into()));

        refocus(&ctx, "v2");
        let step = watch_step(&ctx, &mut tracker, &state).unwrap();

        let range = BlockRange::new(0, 1);
        match step {
            Some(Activation::Applied(view, outcome)) => {
                assert_eq!(view, ViewId::from("v2"));
                assert_eq!(
                    outcome,
                    Some(ViewOutcome::Applied {
                        action: FoldAction::Fold,
                        range
                    })
                );
            }
            other => panic!("expected an applied activation, got {:?}", other),
        }
        assert_eq!(folded(&ctx, "v2"), vec![range]);
        assert!(folded(&ctx, "v1").is_empty());
    }

    #[test]
    fn focus_change_is_reported_but_not_applied_when_disabled() {
        let (_tmp, ctx, state) = watched_workspace(false);
        let mut tracker = FocusTracker::new(Some("v1".into()));

        refocus(&ctx, "v2");
        let step = watch_step(&ctx, &mut tracker, &state).unwrap();

        assert!(matches!(step, Some(Activation::Unapplied(ref v)) if v.as_str() == "v2"));
        assert!(folded(&ctx, "v2").is_empty());
    }
}
