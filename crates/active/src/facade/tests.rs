use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use pretty_assertions::assert_eq;
use reposcope_worker::{ExclusiveError, ExclusiveJob};

use super::refresh::RefreshOutcome;
use super::*;
use crate::error::{InitError, MappingError};
use crate::factory::LocalRepositoryFactory;
use crate::model::LocalRepository;
use crate::service::InMemoryService;

#[derive(Clone, Default)]
struct FlakyFactory {
	fail_on: Arc<Mutex<Option<PathBuf>>>,
}

impl RepositoryFactory for FlakyFactory {
	type Record = LocalRepository;

	fn create(&self, path: &Path) -> Result<LocalRepository, MappingError> {
		if self.fail_on.lock().as_deref() == Some(path) {
			return Err(MappingError::Other {
				path: path.to_path_buf(),
				reason: "scripted failure".to_string(),
			});
		}
		LocalRepositoryFactory.create(path)
	}
}

fn provider_for(service: Option<Arc<InMemoryService>>) -> impl ServiceProvider {
	move || -> Option<Arc<dyn RepositoryService>> { service.clone().map(|s| s as Arc<dyn RepositoryService>) }
}

fn facade_with<F>(service: Option<Arc<InMemoryService>>, factory: F) -> ActiveRepositories<LocalRepository>
where
	F: RepositoryFactory<Record = LocalRepository>,
{
	ActiveRepositories::builder(provider_for(service), factory).build().unwrap()
}

fn paths(facade: &ActiveRepositories<LocalRepository>) -> Vec<PathBuf> {
	facade.active_repositories().iter().map(|r| r.path().to_path_buf()).collect()
}

fn initialized(service: &Arc<InMemoryService>) -> ActiveRepositories<LocalRepository> {
	let facade = facade_with(Some(Arc::clone(service)), LocalRepositoryFactory);
	facade.start();
	facade.join();
	assert_eq!(facade.state(), FacadeState::Ready);
	facade
}

#[test]
fn refresh_before_binding_is_a_noop_on_empty_snapshot() {
	let facade = facade_with(None, LocalRepositoryFactory);
	assert_eq!(facade.inner.refresh(), RefreshOutcome::Unbound { cleared: None });
	assert_eq!(facade.active_repositories().generation(), 0);
}

#[test]
fn outcomes_track_content_changes() {
	let service = Arc::new(InMemoryService::with_paths(["/a", "/b"]));
	let facade = initialized(&service);
	assert_eq!(paths(&facade), vec![PathBuf::from("/a"), PathBuf::from("/b")]);
	assert_eq!(facade.active_repositories().generation(), 1);

	assert_eq!(facade.inner.refresh(), RefreshOutcome::Unchanged);

	service.replace_descriptors(["/b"]);
	assert_eq!(facade.inner.refresh(), RefreshOutcome::Changed { generation: 2, count: 1 });
}

#[test]
fn read_failure_clears_and_recovers() {
	let service = Arc::new(InMemoryService::with_paths(["/a"]));
	let facade = initialized(&service);
	let notified = Arc::new(AtomicUsize::new(0));
	let notified_clone = Arc::clone(&notified);
	facade.on_active_repositories_changed(move || {
		notified_clone.fetch_add(1, Ordering::SeqCst);
	});

	service.fail_next(crate::error::ServiceError::new("host restarting"));
	assert_eq!(facade.inner.refresh(), RefreshOutcome::Failed { cleared: Some(2) });
	assert!(facade.active_repositories().is_empty());
	assert_eq!(facade.state(), FacadeState::Ready);

	service.fail_next(crate::error::ServiceError::new("still restarting"));
	assert_eq!(facade.inner.refresh(), RefreshOutcome::Failed { cleared: None });

	assert!(matches!(facade.inner.refresh(), RefreshOutcome::Changed { count: 1, .. }));
	assert_eq!(notified.load(Ordering::SeqCst), 2);
}

#[test]
fn mapping_failure_leaves_no_partial_snapshot() {
	let service = Arc::new(InMemoryService::with_paths(["/a", "/b", "/c"]));
	let factory = FlakyFactory::default();
	*factory.fail_on.lock() = Some(PathBuf::from("/b"));
	let facade = facade_with(Some(Arc::clone(&service)), factory.clone());
	facade.start();
	facade.join();

	assert!(facade.active_repositories().is_empty());
	assert_eq!(facade.state(), FacadeState::Ready);

	*factory.fail_on.lock() = None;
	facade.refresh_active_repositories();
	assert_eq!(paths(&facade).len(), 3);
}

#[test]
fn initialization_runs_once() {
	let service = Arc::new(InMemoryService::with_paths(["/a"]));
	let facade = initialized(&service);
	let runtime = facade.inner.gate.runtime().clone();
	let result = runtime.handle().block_on(facade.inner.initialize());
	assert_eq!(result, Err(InitError::AlreadyStarted));

	facade.start();
	facade.join();
	assert_eq!(service.subscriber_count(), 1);
	assert_eq!(facade.task_stats().panicked, 0);
}

#[test]
fn missing_service_is_terminal() {
	let facade = facade_with(None, LocalRepositoryFactory);
	let mut states = facade.subscribe_state();
	facade.start();
	facade.join();
	assert_eq!(facade.state(), FacadeState::Failed);
	assert_eq!(*states.borrow_and_update(), FacadeState::Failed);

	facade.refresh_active_repositories();
	assert!(facade.active_repositories().is_empty());
}

struct ClosedContext;

impl ExclusiveContext for ClosedContext {
	fn execute(&self, _job: ExclusiveJob) -> Result<(), ExclusiveError> {
		Err(ExclusiveError::Closed)
	}
}

#[test]
fn closed_exclusive_context_fails_initialization() {
	let service = Arc::new(InMemoryService::with_paths(["/a"]));
	let facade = ActiveRepositories::builder(provider_for(Some(service)), LocalRepositoryFactory)
		.exclusive_context(Arc::new(ClosedContext))
		.build()
		.unwrap();
	let runtime = facade.inner.gate.runtime().clone();
	let result = runtime.handle().block_on(facade.inner.initialize());
	assert_eq!(result, Err(InitError::ExclusiveContextClosed(ExclusiveError::Closed)));
	assert_eq!(facade.state(), FacadeState::Failed);
	assert!(facade.active_repositories().is_empty());
}

#[test]
fn lookup_runs_on_exclusive_thread() {
	let seen = Arc::new(Mutex::new(None));
	let seen_clone = Arc::clone(&seen);
	let provider = move || -> Option<Arc<dyn RepositoryService>> {
		*seen_clone.lock() = std::thread::current().name().map(str::to_string);
		None
	};
	let facade = ActiveRepositories::builder(provider, LocalRepositoryFactory).build().unwrap();
	facade.start();
	facade.join();
	assert_eq!(seen.lock().as_deref(), Some("reposcope-exclusive"));
}

#[test]
fn host_change_event_schedules_refresh() {
	let service = Arc::new(InMemoryService::with_paths(["/a"]));
	let facade = initialized(&service);
	let mut changes = facade.watch_changes();
	assert_eq!(*changes.borrow_and_update(), 1);

	service.set_descriptors(["/a", "/z"]);
	facade.join();
	assert_eq!(paths(&facade), vec![PathBuf::from("/a"), PathBuf::from("/z")]);
	assert!(changes.has_changed().unwrap());
	assert_eq!(*changes.borrow_and_update(), 2);
}

#[test]
fn listener_may_reenter_the_facade() {
	let service = Arc::new(InMemoryService::with_paths(["/a"]));
	let facade = initialized(&service);
	let observed = Arc::new(Mutex::new(Vec::new()));

	let handle = facade.clone();
	let observed_clone = Arc::clone(&observed);
	let id = Arc::new(Mutex::new(None));
	let id_clone = Arc::clone(&id);
	let listener = facade.on_active_repositories_changed(move || {
		observed_clone.lock().push(handle.active_repositories().len());
		handle.refresh_active_repositories();
		handle.join();
		if let Some(id) = id_clone.lock().take() {
			handle.remove_listener(id);
		}
	});
	*id.lock() = Some(listener);

	service.set_descriptors(["/a", "/b"]);
	assert!(facade.join_timeout(Duration::from_secs(5)));
	assert_eq!(*observed.lock(), vec![2]);
	assert!(!facade.remove_listener(listener));
}

#[test]
fn debug_output_reports_state() {
	let facade = facade_with(None, LocalRepositoryFactory);
	let rendered = format!("{facade:?}");
	assert!(rendered.contains("Uninitialized"), "{rendered}");
}

#[test]
fn late_announcement_does_not_rewind_watch() {
	let service = Arc::new(InMemoryService::with_paths(["/a"]));
	let facade = initialized(&service);
	let mut changes = facade.watch_changes();

	service.replace_descriptors(["/a", "/b"]);
	assert_eq!(facade.inner.refresh(), RefreshOutcome::Changed { generation: 2, count: 2 });
	assert_eq!(*changes.borrow_and_update(), 2);

	facade.inner.notify(1);
	assert!(!changes.has_changed().unwrap());
	assert_eq!(*changes.borrow(), 2);
}

/// Factory whose first record waits for a signal from the worker runtime.
#[derive(Clone)]
struct HandshakeFactory {
	entered: Arc<AtomicBool>,
	release: Arc<Mutex<std::sync::mpsc::Receiver<()>>>,
	released: Arc<AtomicBool>,
}

impl RepositoryFactory for HandshakeFactory {
	type Record = LocalRepository;

	fn create(&self, path: &Path) -> Result<LocalRepository, MappingError> {
		self.entered.store(true, Ordering::SeqCst);
		let released = self.release.lock().recv_timeout(Duration::from_secs(2)).is_ok();
		self.released.store(released, Ordering::SeqCst);
		LocalRepositoryFactory.create(path)
	}
}

#[test]
fn first_refresh_leaves_async_workers_free() {
	let runtime = tokio::runtime::Builder::new_multi_thread().worker_threads(1).enable_all().build().unwrap();
	let (release_tx, release_rx) = std::sync::mpsc::channel();
	let factory = HandshakeFactory {
		entered: Arc::new(AtomicBool::new(false)),
		release: Arc::new(Mutex::new(release_rx)),
		released: Arc::new(AtomicBool::new(false)),
	};
	let service = Arc::new(InMemoryService::with_paths(["/a"]));
	let facade = ActiveRepositories::builder(provider_for(Some(service)), factory.clone())
		.runtime(WorkerRuntime::from_handle(runtime.handle().clone()))
		.build()
		.unwrap();

	// Only runs if the single async worker is not stuck inside the factory.
	let entered = Arc::clone(&factory.entered);
	runtime.spawn(async move {
		while !entered.load(Ordering::SeqCst) {
			tokio::time::sleep(Duration::from_millis(1)).await;
		}
		let _ = release_tx.send(());
	});

	facade.start();
	assert!(facade.join_timeout(Duration::from_secs(5)));
	assert!(factory.released.load(Ordering::SeqCst));
	assert_eq!(paths(&facade), vec![PathBuf::from("/a")]);
	assert_eq!(facade.state(), FacadeState::Ready);
}

#[test]
fn listener_join_during_first_refresh_does_not_wait_on_itself() {
	let service = Arc::new(InMemoryService::with_paths(["/a"]));
	let facade = facade_with(Some(Arc::clone(&service)), LocalRepositoryFactory);
	let handle = facade.clone();
	let joined = Arc::new(AtomicUsize::new(0));
	let joined_clone = Arc::clone(&joined);
	facade.on_active_repositories_changed(move || {
		handle.join();
		joined_clone.fetch_add(1, Ordering::SeqCst);
	});

	facade.start();
	assert!(facade.join_timeout(Duration::from_secs(5)));
	assert_eq!(joined.load(Ordering::SeqCst), 1);
	assert_eq!(facade.state(), FacadeState::Ready);
}
