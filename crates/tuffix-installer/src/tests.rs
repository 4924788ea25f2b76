use super::*;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tuffix_core::{
    BuildConfig, Keyword, KeywordAction, KeywordOrigin, PackageIntent, PackageKeyword,
    PackageManager, TuffixError,
};
use tuffix_registry::{CustomKeywordCatalog, KeywordRegistry};

use crate::apt::{
    build_autoremove_command, build_commit_command, build_show_command, build_update_command,
    classify_apt_failure, parse_lock_holder,
};

static TEST_LAYOUT_COUNTER: AtomicU64 = AtomicU64::new(0);

fn build_test_layout_path(nanos: u128) -> PathBuf {
    let mut path = std::env::temp_dir();
    let sequence = TEST_LAYOUT_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.push(format!(
        "tuffix-installer-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        sequence
    ));
    path
}

fn test_layout() -> StateLayout {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    StateLayout::new(build_test_layout_path(nanos))
}

fn test_config() -> BuildConfig {
    BuildConfig {
        version: "1.2.0".to_string(),
        ..BuildConfig::default()
    }
}

#[test]
fn build_test_layout_path_disambiguates_same_timestamp_calls() {
    assert_ne!(build_test_layout_path(42), build_test_layout_path(42));
}

#[test]
fn layout_paths_hang_off_the_state_root() {
    let layout = StateLayout::new("/var/lib/tuffix");
    assert_eq!(layout.root(), PathBuf::from("/var/lib/tuffix").as_path());
    assert_eq!(
        layout.state_path(),
        PathBuf::from("/var/lib/tuffix/state.json")
    );
    assert_eq!(layout.tmp_dir(), PathBuf::from("/var/lib/tuffix/tmp"));
    assert_eq!(
        layout.custom_keywords_dir(),
        PathBuf::from("/var/lib/tuffix/custom")
    );
}

#[test]
fn read_before_init_reports_missing_state() {
    let layout = test_layout();
    let store = StateStore::new(layout.clone());

    let err = store.read().expect_err("no record yet");
    assert!(matches!(err, TuffixError::StateMissing(path) if path == layout.state_path()));
    assert!(!store.exists());
}

#[test]
fn initialize_writes_empty_record_with_configured_version() {
    let layout = test_layout();
    let store = StateStore::new(layout.clone());
    let config = test_config();

    let state = store.initialize(&config).expect("must initialize");
    assert!(state.installed.is_empty());
    assert_eq!(state.version, "1.2.0");

    let read = store.read().expect("must read back");
    assert_eq!(read, state);
    assert!(layout.tmp_dir().is_dir());
    assert!(layout.custom_keywords_dir().is_dir());

    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn initialize_twice_is_a_usage_error() {
    let layout = test_layout();
    let store = StateStore::new(layout.clone());
    let config = test_config();

    store.initialize(&config).expect("first init");
    let err = store.initialize(&config).expect_err("second init must fail");
    assert!(err.is_usage());
    assert_eq!(err.to_string(), "init has already been done");

    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn write_replaces_record_and_leaves_no_staging_files() {
    let layout = test_layout();
    let store = StateStore::new(layout.clone());
    store.initialize(&test_config()).expect("init");

    let state = State {
        version: "1.2.0".to_string(),
        installed: vec!["base".to_string(), "latex".to_string()],
    };
    store.write(&state).expect("must write");

    assert_eq!(store.read().expect("read"), state);
    let leftovers = fs::read_dir(layout.tmp_dir())
        .expect("tmp dir")
        .collect::<Vec<_>>();
    assert!(leftovers.is_empty(), "staging file left behind");

    let raw = fs::read_to_string(layout.state_path()).expect("raw record");
    assert!(raw.contains("\"installed\""));
    assert!(raw.ends_with('\n'));

    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn corrupt_record_is_a_state_error() {
    let layout = test_layout();
    fs::create_dir_all(layout.root()).expect("root");
    fs::write(layout.state_path(), "{not json").expect("write corrupt");

    let err = StateStore::new(layout.clone())
        .read()
        .expect_err("corrupt record");
    assert!(matches!(err, TuffixError::State { .. }));
    assert!(err.to_string().contains("failed to parse"));

    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn read_drops_duplicate_names_keeping_first_position() {
    let layout = test_layout();
    fs::create_dir_all(layout.root()).expect("root");
    fs::write(
        layout.state_path(),
        r#"{"version":"1.0.0","installed":["base","media","base"]}"#,
    )
    .expect("write record");

    let state = StateStore::new(layout.clone()).read().expect("read");
    assert_eq!(state.installed, vec!["base", "media"]);

    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn state_mark_helpers_keep_order() {
    let mut state = State::new(
        &test_config(),
        vec!["base".to_string(), "media".to_string(), "base".to_string()],
    );
    assert_eq!(state.installed, vec!["base", "media"]);

    assert!(state.mark_installed("latex"));
    assert!(!state.mark_installed("media"));
    assert!(state.mark_removed("base"));
    assert!(!state.mark_removed("base"));
    assert_eq!(state.installed, vec!["media", "latex"]);
}

#[derive(Debug, Default)]
struct CacheLog {
    refreshes: usize,
    opened: usize,
    released: usize,
    commits: Vec<Vec<(String, PackageIntent)>>,
}

#[derive(Debug)]
struct FakeBackend {
    known: BTreeSet<String>,
    refresh_failure: Option<BackendFailure>,
    commit_failure: Option<BackendFailure>,
    log: Rc<RefCell<CacheLog>>,
    autoremoves: usize,
}

impl FakeBackend {
    fn knowing(names: &[&str]) -> Self {
        Self {
            known: names.iter().map(|name| name.to_string()).collect(),
            refresh_failure: None,
            commit_failure: None,
            log: Rc::default(),
            autoremoves: 0,
        }
    }
}

struct FakeCache {
    known: BTreeSet<String>,
    marked: Vec<(String, PackageIntent)>,
    commit_failure: Option<BackendFailure>,
    log: Rc<RefCell<CacheLog>>,
}

impl PackageCache for FakeCache {
    fn contains(&self, name: &str) -> Result<bool, TuffixError> {
        Ok(self.known.contains(name))
    }

    fn mark(&mut self, name: &str, intent: PackageIntent) {
        self.marked.push((name.to_string(), intent));
    }

    fn commit(&mut self) -> Result<(), BackendFailure> {
        if let Some(failure) = self.commit_failure.clone() {
            return Err(failure);
        }
        self.log
            .borrow_mut()
            .commits
            .push(std::mem::take(&mut self.marked));
        Ok(())
    }
}

impl Drop for FakeCache {
    fn drop(&mut self) {
        self.log.borrow_mut().released += 1;
    }
}

impl PackageBackend for FakeBackend {
    type Cache = FakeCache;

    fn refresh(&mut self) -> Result<(), BackendFailure> {
        self.log.borrow_mut().refreshes += 1;
        match self.refresh_failure.clone() {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }

    fn open(&mut self) -> Result<Self::Cache, TuffixError> {
        self.log.borrow_mut().opened += 1;
        Ok(FakeCache {
            known: self.known.clone(),
            marked: Vec::new(),
            commit_failure: self.commit_failure.clone(),
            log: Rc::clone(&self.log),
        })
    }

    fn autoremove(&mut self) -> Result<(), TuffixError> {
        self.autoremoves += 1;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct FakeProcesses {
    by_name: BTreeMap<String, Vec<u32>>,
    refuse: BTreeSet<u32>,
    terminated: Vec<u32>,
}

impl FakeProcesses {
    fn with(mut self, name: &str, pids: &[u32]) -> Self {
        self.by_name.insert(name.to_string(), pids.to_vec());
        self
    }
}

impl ProcessTable for FakeProcesses {
    fn pids_named(&self, name: &str) -> Vec<u32> {
        self.by_name.get(name).cloned().unwrap_or_default()
    }

    fn terminate(&mut self, pid: u32) -> io::Result<()> {
        if self.refuse.contains(&pid) {
            return Err(io::Error::from(io::ErrorKind::PermissionDenied));
        }
        self.terminated.push(pid);
        Ok(())
    }
}

fn package_set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|name| name.to_string()).collect()
}

#[test]
fn executor_commits_the_whole_batch_once() {
    let backend = FakeBackend::knowing(&["git", "make"]);
    let log = Rc::clone(&backend.log);
    let mut executor = TransactionExecutor::new(backend, FakeProcesses::default());

    executor
        .apply(&package_set(&["make", "git"]), PackageIntent::Install)
        .expect("batch must commit");

    let log = log.borrow();
    assert_eq!(log.refreshes, 1);
    assert_eq!(log.opened, 1);
    assert_eq!(log.released, 1);
    assert_eq!(
        log.commits,
        vec![vec![
            ("git".to_string(), PackageIntent::Install),
            ("make".to_string(), PackageIntent::Install),
        ]]
    );
}

#[test]
fn executor_unknown_package_aborts_before_commit_and_releases_cache() {
    let backend = FakeBackend::knowing(&["git"]);
    let log = Rc::clone(&backend.log);
    let mut executor = TransactionExecutor::new(backend, FakeProcesses::default());

    let err = executor
        .apply(&package_set(&["git", "no-such-pkg"]), PackageIntent::Install)
        .expect_err("unknown package");

    assert!(matches!(err, TuffixError::PackageNotFound(name) if name == "no-such-pkg"));
    let log = log.borrow();
    assert!(log.commits.is_empty());
    assert_eq!(log.released, 1);
}

#[test]
fn executor_empty_set_touches_nothing() {
    let backend = FakeBackend::knowing(&[]);
    let log = Rc::clone(&backend.log);
    let mut executor = TransactionExecutor::new(backend, FakeProcesses::default());

    executor
        .apply(&BTreeSet::new(), PackageIntent::Remove)
        .expect("empty set is a no-op");
    assert_eq!(log.borrow().refreshes, 0);
    assert_eq!(log.borrow().opened, 0);
}

#[test]
fn executor_lock_with_named_holder_terminates_only_that_pid() {
    let mut backend = FakeBackend::knowing(&["vlc"]);
    backend.commit_failure = Some(BackendFailure::ResourceHeld {
        holder: Some(4242),
        detail: "It is held by process 4242 (apt)".to_string(),
    });
    let log = Rc::clone(&backend.log);
    let processes = FakeProcesses::default().with("apt", &[4242, 5000]);
    let mut executor = TransactionExecutor::new(backend, processes);

    let err = executor
        .apply(&package_set(&["vlc"]), PackageIntent::Install)
        .expect_err("lock contention");

    assert!(err.is_retryable());
    match err {
        TuffixError::ResourceHeld {
            resource,
            terminated,
        } => {
            assert_eq!(resource, "apt");
            assert_eq!(terminated, vec![4242]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(executor.processes().terminated, vec![4242]);
    assert_eq!(log.borrow().released, 1);
}

#[test]
fn executor_lock_without_holder_terminates_apt_processes_but_never_self() {
    let own_pid = std::process::id();
    let mut backend = FakeBackend::knowing(&["vlc"]);
    backend.commit_failure = Some(BackendFailure::ResourceHeld {
        holder: None,
        detail: "Unable to lock directory /var/cache/apt/archives/".to_string(),
    });
    let processes = FakeProcesses::default()
        .with("apt", &[300, own_pid, 1])
        .with("apt-get", &[200, 300]);
    let mut executor = TransactionExecutor::new(backend, processes);

    let err = executor
        .apply(&package_set(&["vlc"]), PackageIntent::Remove)
        .expect_err("lock contention");

    assert!(matches!(
        err,
        TuffixError::ResourceHeld { ref terminated, .. } if terminated == &vec![200, 300]
    ));
    assert_eq!(executor.processes().terminated, vec![200, 300]);
}

#[test]
fn executor_lock_during_refresh_terminates_holder_before_opening_cache() {
    let mut backend = FakeBackend::knowing(&["vlc"]);
    backend.refresh_failure = Some(classify_apt_failure(
        "E: Could not get lock /var/lib/apt/lists/lock. It is held by process 777 (apt-get)",
    ));
    let log = Rc::clone(&backend.log);
    let processes = FakeProcesses::default().with("apt-get", &[777, 778]);
    let mut executor = TransactionExecutor::new(backend, processes);

    let err = executor
        .apply(&package_set(&["vlc"]), PackageIntent::Install)
        .expect_err("index lock contention");

    assert!(err.is_retryable());
    assert!(matches!(
        err,
        TuffixError::ResourceHeld { ref terminated, .. } if terminated == &vec![777]
    ));
    assert_eq!(executor.processes().terminated, vec![777]);
    let log = log.borrow();
    assert_eq!(log.refreshes, 1);
    assert_eq!(log.opened, 0);
    assert!(log.commits.is_empty());
}

#[test]
fn executor_other_refresh_failure_is_a_package_manager_error() {
    let mut backend = FakeBackend::knowing(&["vlc"]);
    backend.refresh_failure = Some(BackendFailure::Other(
        "E: Failed to fetch http://archive.ubuntu.com/ubuntu".to_string(),
    ));
    let processes = FakeProcesses::default().with("apt", &[9]);
    let mut executor = TransactionExecutor::new(backend, processes);

    let err = executor
        .apply(&package_set(&["vlc"]), PackageIntent::Install)
        .expect_err("refresh failed");

    assert!(!err.is_retryable());
    assert!(err
        .to_string()
        .contains("failed to refresh the package index: E: Failed to fetch"));
    assert!(executor.processes().terminated.is_empty());
}

#[test]
fn terminate_lock_holders_skips_processes_that_refuse() {
    let mut processes = FakeProcesses::default().with("apt-get", &[10, 11]);
    processes.refuse.insert(10);

    assert_eq!(terminate_lock_holders(&mut processes, None), vec![11]);
}

#[test]
fn terminate_lock_holders_with_no_candidates_is_a_no_op() {
    let mut processes = FakeProcesses::default();
    assert!(terminate_lock_holders(&mut processes, None).is_empty());
    assert!(processes.terminated.is_empty());
}

#[test]
fn executor_other_commit_failure_is_a_package_manager_error() {
    let mut backend = FakeBackend::knowing(&["vlc"]);
    backend.commit_failure = Some(BackendFailure::Other("dpkg returned 1".to_string()));
    let mut executor = TransactionExecutor::new(backend, FakeProcesses::default());

    let err = executor
        .apply(&package_set(&["vlc"]), PackageIntent::Install)
        .expect_err("commit failure");

    assert!(!err.is_retryable());
    match err {
        TuffixError::PackageManager { detail } => {
            assert_eq!(detail, "could not install vlc: dpkg returned 1");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(executor.processes().terminated.is_empty());
}

#[test]
fn executor_forwards_autoremove_to_backend() {
    let mut executor =
        TransactionExecutor::new(FakeBackend::knowing(&[]), FakeProcesses::default());
    executor.autoremove().expect("autoremove");
    assert_eq!(executor.backend().autoremoves, 1);
}

#[test]
fn classify_apt_lock_message_with_holder() {
    let detail = "E: Could not get lock /var/lib/dpkg/lock-frontend. It is held by process 4242 (apt)\n\
                  E: Unable to acquire the dpkg frontend lock (/var/lib/dpkg/lock-frontend), is another process using it?";
    assert_eq!(
        classify_apt_failure(detail),
        BackendFailure::ResourceHeld {
            holder: Some(4242),
            detail: detail.to_string(),
        }
    );
}

#[test]
fn classify_apt_lock_message_without_holder() {
    let detail = "E: Unable to lock directory /var/cache/apt/archives/";
    assert!(matches!(
        classify_apt_failure(detail),
        BackendFailure::ResourceHeld { holder: None, .. }
    ));
}

#[test]
fn classify_other_apt_failures() {
    let detail = "E: Unable to locate package nosuchpkg";
    assert_eq!(
        classify_apt_failure(detail),
        BackendFailure::Other(detail.to_string())
    );
}

#[test]
fn parse_lock_holder_requires_digits() {
    assert_eq!(parse_lock_holder("held by process 77 (apt-get)"), Some(77));
    assert_eq!(parse_lock_holder("held by process (unknown)"), None);
    assert_eq!(parse_lock_holder("could not get lock"), None);
}

fn command_args(command: &std::process::Command) -> Vec<String> {
    command
        .get_args()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect()
}

#[test]
fn apt_commands_are_non_interactive() {
    let commit = build_commit_command(PackageIntent::Remove, &["vlc", "ffmpeg"]);
    assert_eq!(commit.get_program(), "apt-get");
    assert_eq!(command_args(&commit), vec!["-y", "remove", "vlc", "ffmpeg"]);
    assert!(commit
        .get_envs()
        .any(|(key, value)| key == "DEBIAN_FRONTEND"
            && value.is_some_and(|value| value == "noninteractive")));

    assert_eq!(command_args(&build_update_command()), vec!["update"]);
    assert_eq!(
        command_args(&build_autoremove_command()),
        vec!["-y", "autoremove"]
    );

    let show = build_show_command("git");
    assert_eq!(show.get_program(), "apt-cache");
    assert_eq!(
        command_args(&show),
        vec!["show", "--no-all-versions", "git"]
    );
}

#[derive(Debug, Default)]
struct FakePackages {
    missing: BTreeSet<String>,
    locked: BTreeSet<String>,
    applied: Vec<(Vec<String>, PackageIntent)>,
    autoremoves: usize,
    autoremove_fails: bool,
}

impl PackageManager for FakePackages {
    fn apply(
        &mut self,
        packages: &BTreeSet<String>,
        intent: PackageIntent,
    ) -> Result<(), TuffixError> {
        if let Some(name) = packages.iter().find(|name| self.missing.contains(*name)) {
            return Err(TuffixError::PackageNotFound(name.clone()));
        }
        if packages.iter().any(|name| self.locked.contains(name)) {
            return Err(TuffixError::ResourceHeld {
                resource: "apt".to_string(),
                terminated: vec![4242],
            });
        }
        self.applied
            .push((packages.iter().cloned().collect(), intent));
        Ok(())
    }

    fn autoremove(&mut self) -> Result<(), TuffixError> {
        self.autoremoves += 1;
        if self.autoremove_fails {
            return Err(TuffixError::package_manager("autoremove failed"));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct FakeConfirmer {
    answer: bool,
    prompts: Vec<String>,
}

impl Confirmer for FakeConfirmer {
    fn confirm(&mut self, prompt: &str) -> bool {
        self.prompts.push(prompt.to_string());
        self.answer
    }
}

#[derive(Debug)]
struct FakePrivilege {
    granted: bool,
}

impl PrivilegeCheck for FakePrivilege {
    fn ensure_privileged(&self) -> Result<(), TuffixError> {
        if self.granted {
            return Ok(());
        }
        Err(TuffixError::Permission("must be run as root".to_string()))
    }
}

fn keyword(name: &str, packages: &[&str]) -> Arc<dyn Keyword> {
    Arc::new(PackageKeyword::new(
        name,
        format!("{name} test keyword"),
        package_set(packages),
        package_set(packages),
        KeywordOrigin::BuiltIn,
    ))
}

struct MarkHarness {
    layout: StateLayout,
    config: BuildConfig,
    registry: KeywordRegistry,
    store: StateStore,
    packages: FakePackages,
    confirmer: FakeConfirmer,
    privilege: FakePrivilege,
}

impl MarkHarness {
    fn new(installed: &[&str]) -> Self {
        let layout = test_layout();
        let config = test_config();
        let store = StateStore::new(layout.clone());
        store.initialize(&config).expect("init");
        if !installed.is_empty() {
            let state = State::new(
                &config,
                installed.iter().map(|name| name.to_string()).collect(),
            );
            store.write(&state).expect("seed state");
        }

        let registry = KeywordRegistry::from_keywords(vec![
            keyword("base", &["build-essential", "git"]),
            keyword("media", &["vlc"]),
            keyword("latex", &["texlive-full"]),
        ])
        .with_custom_catalog(CustomKeywordCatalog::open(layout.custom_keywords_dir()));

        Self {
            layout,
            config,
            registry,
            store,
            packages: FakePackages::default(),
            confirmer: FakeConfirmer {
                answer: true,
                prompts: Vec::new(),
            },
            privilege: FakePrivilege { granted: true },
        }
    }

    fn mark(&mut self, action: KeywordAction, names: &[&str]) -> Result<MarkOutcome, MarkFailure> {
        let names = names.iter().map(|name| name.to_string()).collect::<Vec<_>>();
        let mut engine = MarkEngine::new(
            &self.config,
            &mut self.registry,
            &self.store,
            &mut self.packages,
            &mut self.confirmer,
            &self.privilege,
        );
        engine.mark(action, &names)
    }

    fn install_custom(&mut self, sources: &[PathBuf]) -> Result<MarkOutcome, MarkFailure> {
        let mut engine = MarkEngine::new(
            &self.config,
            &mut self.registry,
            &self.store,
            &mut self.packages,
            &mut self.confirmer,
            &self.privilege,
        );
        engine.install_custom(sources)
    }

    /// Write a definition file outside the custom catalog, ready to import.
    fn write_source(&self, file_name: &str, contents: &str) -> PathBuf {
        let dir = self.layout.root().join("incoming");
        fs::create_dir_all(&dir).expect("must create source dir");
        let path = dir.join(file_name);
        fs::write(&path, contents).expect("must write source");
        path
    }

    fn stored_custom(&self) -> Vec<String> {
        CustomKeywordCatalog::open(self.layout.custom_keywords_dir())
            .names()
            .expect("must list custom catalog")
    }

    fn installed(&self) -> Vec<String> {
        self.store.read().expect("state").installed
    }

    fn applied_names(&self) -> Vec<Vec<String>> {
        self.packages
            .applied
            .iter()
            .map(|(names, _)| names.clone())
            .collect()
    }
}

impl Drop for MarkHarness {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(self.layout.root());
    }
}

fn completed(action: KeywordAction, names: &[&str]) -> MarkOutcome {
    MarkOutcome::Completed {
        action,
        keywords: names.iter().map(|name| name.to_string()).collect(),
    }
}

#[test]
fn mark_rejects_empty_request() {
    let mut harness = MarkHarness::new(&[]);
    let failure = harness
        .mark(KeywordAction::Install, &[])
        .expect_err("empty request");
    assert!(failure.error.is_usage());
    assert!(failure.keyword.is_none());
    assert!(!failure.is_partial());
}

#[test]
fn mark_unknown_keyword_has_no_side_effects() {
    let mut harness = MarkHarness::new(&[]);
    let failure = harness
        .mark(KeywordAction::Install, &["base", "nonesuch"])
        .expect_err("unknown keyword");

    assert!(matches!(failure.error, TuffixError::UnknownKeyword(ref name) if name == "nonesuch"));
    assert!(harness.packages.applied.is_empty());
    assert!(harness.installed().is_empty());
}

#[test]
fn mark_install_base_runs_hook_once_and_records_it() {
    let mut harness = MarkHarness::new(&[]);
    let outcome = harness
        .mark(KeywordAction::Install, &["base"])
        .expect("install base");

    assert_eq!(outcome, completed(KeywordAction::Install, &["base"]));
    assert_eq!(
        harness.applied_names(),
        vec![vec!["build-essential".to_string(), "git".to_string()]]
    );
    assert_eq!(harness.packages.applied[0].1, PackageIntent::Install);
    assert_eq!(harness.installed(), vec!["base"]);
    assert_eq!(harness.packages.autoremoves, 1);
}

#[test]
fn mark_install_already_installed_fails_and_keeps_state() {
    let mut harness = MarkHarness::new(&["base"]);
    let failure = harness
        .mark(KeywordAction::Install, &["base"])
        .expect_err("already installed");

    assert!(matches!(failure.error, TuffixError::AlreadyInstalled(ref name) if name == "base"));
    assert_eq!(failure.keyword.as_deref(), Some("base"));
    assert!(harness.packages.applied.is_empty());
    assert_eq!(harness.installed(), vec!["base"]);
}

#[test]
fn mark_failure_part_way_keeps_earlier_keywords_committed() {
    let mut harness = MarkHarness::new(&[]);
    harness.packages.missing.insert("vlc".to_string());

    let failure = harness
        .mark(KeywordAction::Install, &["base", "media", "latex"])
        .expect_err("media hook fails");

    assert!(matches!(failure.error, TuffixError::PackageNotFound(ref name) if name == "vlc"));
    assert_eq!(failure.keyword.as_deref(), Some("media"));
    assert_eq!(failure.committed, vec!["base"]);
    assert!(failure.is_partial());
    assert_eq!(failure.to_string(), "could not install 'media'");
    assert_eq!(harness.installed(), vec!["base"]);
    assert_eq!(harness.applied_names().len(), 1, "latex must not be touched");
}

#[test]
fn mark_lock_contention_surfaces_retryable_error() {
    let mut harness = MarkHarness::new(&[]);
    harness.packages.locked.insert("git".to_string());

    let failure = harness
        .mark(KeywordAction::Install, &["base"])
        .expect_err("lock held");

    assert!(failure.error.is_retryable());
    assert!(harness.installed().is_empty());
    assert_eq!(harness.packages.autoremoves, 0);
}

#[test]
fn mark_remove_all_declined_touches_nothing() {
    let mut harness = MarkHarness::new(&["base", "media"]);
    harness.confirmer.answer = false;

    let outcome = harness
        .mark(KeywordAction::Remove, &["all"])
        .expect("cancel is not an error");

    assert_eq!(outcome, MarkOutcome::Cancelled);
    assert_eq!(harness.confirmer.prompts.len(), 1);
    assert!(harness.confirmer.prompts[0].contains("base, media"));
    assert!(harness.packages.applied.is_empty());
    assert_eq!(harness.installed(), vec!["base", "media"]);
}

#[test]
fn mark_remove_all_expands_to_installed_set() {
    let mut harness = MarkHarness::new(&["media", "base"]);

    let outcome = harness
        .mark(KeywordAction::Remove, &["all"])
        .expect("remove all");

    assert_eq!(outcome, completed(KeywordAction::Remove, &["media", "base"]));
    assert!(harness
        .packages
        .applied
        .iter()
        .all(|(_, intent)| *intent == PackageIntent::Remove));
    assert!(harness.installed().is_empty());
}

#[test]
fn mark_install_all_expands_to_catalog_after_confirmation() {
    let mut harness = MarkHarness::new(&[]);

    let outcome = harness
        .mark(KeywordAction::Install, &["all"])
        .expect("install all");

    assert_eq!(
        outcome,
        completed(KeywordAction::Install, &["base", "media", "latex"])
    );
    assert_eq!(harness.confirmer.prompts.len(), 1);
    assert_eq!(harness.installed(), vec!["base", "media", "latex"]);
}

#[test]
fn mark_remove_all_with_nothing_installed_skips_prompt() {
    let mut harness = MarkHarness::new(&[]);

    let outcome = harness
        .mark(KeywordAction::Remove, &["all"])
        .expect("nothing to remove");

    assert_eq!(outcome, completed(KeywordAction::Remove, &[]));
    assert!(harness.confirmer.prompts.is_empty());
}

#[test]
fn mark_all_cannot_be_mixed_with_names() {
    let mut harness = MarkHarness::new(&[]);
    let failure = harness
        .mark(KeywordAction::Install, &["all", "base"])
        .expect_err("mixed all");
    assert!(failure.error.is_usage());
    assert!(harness.confirmer.prompts.is_empty());
}

#[test]
fn mark_rejects_duplicate_names() {
    let mut harness = MarkHarness::new(&[]);
    let failure = harness
        .mark(KeywordAction::Install, &["base", "base"])
        .expect_err("duplicate");
    assert!(failure.error.is_usage());
    assert!(harness.packages.applied.is_empty());
}

#[test]
fn mark_without_privilege_fails_before_any_change() {
    let mut harness = MarkHarness::new(&[]);
    harness.privilege.granted = false;

    let failure = harness
        .mark(KeywordAction::Install, &["base"])
        .expect_err("not root");

    assert!(matches!(failure.error, TuffixError::Permission(_)));
    assert!(harness.packages.applied.is_empty());
    assert!(harness.installed().is_empty());
}

#[test]
fn mark_remove_not_installed_fails() {
    let mut harness = MarkHarness::new(&["base"]);
    let failure = harness
        .mark(KeywordAction::Remove, &["media"])
        .expect_err("not installed");

    assert!(matches!(failure.error, TuffixError::NotInstalled(ref name) if name == "media"));
    assert_eq!(harness.installed(), vec!["base"]);
}

#[test]
fn mark_processes_keywords_in_request_order() {
    let mut harness = MarkHarness::new(&[]);
    harness
        .mark(KeywordAction::Install, &["latex", "base"])
        .expect("install");

    assert_eq!(
        harness.applied_names(),
        vec![
            vec!["texlive-full".to_string()],
            vec!["build-essential".to_string(), "git".to_string()],
        ]
    );
    assert_eq!(harness.installed(), vec!["latex", "base"]);
}

#[test]
fn mark_remove_keeps_remaining_names_in_order() {
    let mut harness = MarkHarness::new(&["base", "media", "latex"]);
    harness
        .mark(KeywordAction::Remove, &["media"])
        .expect("remove media");
    assert_eq!(harness.installed(), vec!["base", "latex"]);
}

#[test]
fn mark_tolerates_autoremove_failure() {
    let mut harness = MarkHarness::new(&[]);
    harness.packages.autoremove_fails = true;

    let outcome = harness
        .mark(KeywordAction::Install, &["base", "media"])
        .expect("autoremove is best effort");

    assert_eq!(outcome, completed(KeywordAction::Install, &["base", "media"]));
    assert_eq!(harness.packages.autoremoves, 2);
}

#[test]
fn mark_falls_back_to_custom_catalog() {
    let mut harness = MarkHarness::new(&[]);
    fs::write(
        harness.layout.custom_keywords_dir().join("tools.toml"),
        "name = \"tools\"\ndescription = \"Extra tools\"\n\n[install]\npackages = [\"htop\"]\n",
    )
    .expect("write custom definition");

    harness
        .mark(KeywordAction::Install, &["tools"])
        .expect("custom keyword");

    assert_eq!(harness.applied_names(), vec![vec!["htop".to_string()]]);
    assert_eq!(harness.installed(), vec!["tools"]);
}

#[test]
fn mark_restamps_version_on_write() {
    let mut harness = MarkHarness::new(&[]);
    harness
        .store
        .write(&State {
            version: "0.9.0".to_string(),
            installed: Vec::new(),
        })
        .expect("old record");

    harness
        .mark(KeywordAction::Install, &["media"])
        .expect("install media");

    assert_eq!(harness.store.read().expect("state").version, "1.2.0");
}

#[test]
fn mark_without_state_reports_missing_init() {
    let mut harness = MarkHarness::new(&[]);
    fs::remove_file(harness.layout.state_path()).expect("remove record");

    let failure = harness
        .mark(KeywordAction::Install, &["base"])
        .expect_err("not initialized");

    assert!(matches!(failure.error, TuffixError::StateMissing(_)));
    assert!(harness.packages.applied.is_empty());
}

const TOOLS_TOML: &str =
    "name = \"tools\"\ndescription = \"Extra tools\"\n\n[install]\npackages = [\"htop\"]\n";

#[test]
fn install_custom_stores_and_installs_batch() {
    let mut harness = MarkHarness::new(&[]);
    let source = harness.write_source("tools.toml", TOOLS_TOML);

    let outcome = harness
        .install_custom(&[source])
        .expect("custom install");

    assert_eq!(outcome, completed(KeywordAction::Install, &["tools"]));
    assert_eq!(harness.stored_custom(), vec!["tools"]);
    assert_eq!(harness.applied_names(), vec![vec!["htop".to_string()]]);
    assert_eq!(harness.installed(), vec!["tools"]);
}

#[test]
fn install_custom_with_invalid_file_stores_nothing() {
    let mut harness = MarkHarness::new(&[]);
    let good = harness.write_source("tools.toml", TOOLS_TOML);
    let broken = harness.write_source(
        "broken.toml",
        "name = \"broken\"\n\n[install]\npackages = [\"vim\"]\n",
    );

    let failure = harness
        .install_custom(&[good, broken])
        .expect_err("missing description");

    assert!(matches!(failure.error, TuffixError::Definition { .. }));
    assert!(!failure.is_partial());
    assert!(harness.stored_custom().is_empty());
    assert!(harness.packages.applied.is_empty());
    assert!(harness.installed().is_empty());
}

#[test]
fn install_custom_without_privilege_stores_nothing() {
    let mut harness = MarkHarness::new(&[]);
    harness.privilege.granted = false;
    let source = harness.write_source("tools.toml", TOOLS_TOML);

    let failure = harness
        .install_custom(&[source])
        .expect_err("not root");

    assert!(matches!(failure.error, TuffixError::Permission(_)));
    assert!(harness.stored_custom().is_empty());
    assert!(harness.packages.applied.is_empty());
}

#[test]
fn install_custom_rejects_installed_keyword_and_keeps_definition() {
    let mut harness = MarkHarness::new(&["tools"]);
    let stored = harness.layout.custom_keywords_dir().join("tools.toml");
    fs::write(&stored, TOOLS_TOML).expect("write installed definition");
    let replacement = harness.write_source(
        "tools.toml",
        "name = \"tools\"\ndescription = \"Other tools\"\n\n[install]\npackages = [\"vim\"]\n",
    );

    let failure = harness
        .install_custom(&[replacement])
        .expect_err("already installed");

    assert!(matches!(failure.error, TuffixError::AlreadyInstalled(ref name) if name == "tools"));
    assert_eq!(failure.keyword.as_deref(), Some("tools"));
    assert_eq!(
        fs::read_to_string(&stored).expect("stored definition"),
        TOOLS_TOML
    );
    assert!(harness.packages.applied.is_empty());
    assert_eq!(harness.installed(), vec!["tools"]);
}

#[test]
fn install_custom_rejects_two_files_with_one_name() {
    let mut harness = MarkHarness::new(&[]);
    let first = harness.write_source("tools.toml", TOOLS_TOML);
    let second = harness.write_source(
        "tools.json",
        r#"{"name": "tools", "description": "Extra tools", "install": {"packages": ["htop"]}}"#,
    );

    let failure = harness
        .install_custom(&[first, second])
        .expect_err("duplicate name");

    assert!(failure.error.is_usage());
    assert!(harness.stored_custom().is_empty());
}

#[test]
fn remove_all_drops_installed_keyword_without_definition() {
    let mut harness = MarkHarness::new(&["media", "ghost"]);

    let outcome = harness
        .mark(KeywordAction::Remove, &["all"])
        .expect("stale name must not block removal");

    assert_eq!(outcome, completed(KeywordAction::Remove, &["media", "ghost"]));
    assert_eq!(harness.applied_names(), vec![vec!["vlc".to_string()]]);
    assert_eq!(harness.packages.autoremoves, 1);
    assert!(harness.installed().is_empty());
}

#[test]
fn remove_named_keyword_without_definition_only_updates_state() {
    let mut harness = MarkHarness::new(&["ghost", "latex"]);

    let outcome = harness
        .mark(KeywordAction::Remove, &["ghost"])
        .expect("stale name");

    assert_eq!(outcome, completed(KeywordAction::Remove, &["ghost"]));
    assert!(harness.packages.applied.is_empty());
    assert_eq!(harness.installed(), vec!["latex"]);

    let failure = harness
        .mark(KeywordAction::Remove, &["ghost"])
        .expect_err("no longer recorded");
    assert!(matches!(failure.error, TuffixError::UnknownKeyword(ref name) if name == "ghost"));
}
