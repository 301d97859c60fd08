use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use cross_state::macros::enclose;
use cross_state::{
	cache, Cache, CacheContext, CacheOptions, CacheState, GetOptions, Registry, Sink, Status, Store,
	Update,
};
use mockall::predicate::eq;
use mockall::Sequence;
use tokio::time::{sleep, Instant};

mod mock;

use mock::{flush, local, Spy};

fn options() -> CacheOptions<u32, String> {
	CacheOptions::from_registry(&Rc::new(Registry::new()))
}

/// A cache whose n-th run resolves to `n` after `delay`.
fn counting(delay: Duration, options: CacheOptions<u32, String>) -> (Cache<u32, String>, Rc<Cell<u32>>) {
	let runs = Rc::new(Cell::new(0));
	let cache = Cache::new(
		enclose!((runs) move |_| {
			runs.set(runs.get() + 1);
			let run = runs.get();
			async move {
				sleep(delay).await;
				Ok(run)
			}
		}),
		options,
	);
	(cache, runs)
}

#[tokio::test(start_paused = true)]
async fn concurrent_gets_share_one_run() {
	local(async {
		let (cache, runs) = counting(Duration::from_millis(100), options());
		let started = Instant::now();

		let first = cache.get();
		let second = cache.get();
		assert!(first.ptr_eq(&second));

		assert_eq!(first.await, Ok(1));
		assert!(started.elapsed() >= Duration::from_millis(100));
		assert_eq!(second.await, Ok(1));
		assert_eq!(runs.get(), 1);
	})
	.await;
}

#[tokio::test(start_paused = true)]
async fn invalidate_keeps_the_last_value_for_background_updates() {
	local(async {
		let (cache, _) = counting(Duration::from_millis(100), options());

		assert_eq!(cache.get().await, Ok(1));
		flush().await;

		cache.invalidate();
		let state = cache.state();
		assert!(state.is_stale);
		assert_eq!(state.get_value(), Some(&1));

		let started = Instant::now();
		assert_eq!(cache.get_with(GetOptions::background()).await, Ok(1));
		assert_eq!(started.elapsed(), Duration::ZERO);
		assert!(cache.state().is_updating);

		sleep(Duration::from_millis(150)).await;
		let state = cache.state();
		assert!(!state.is_stale);
		assert!(!state.is_updating);
		assert_eq!(state.get_value(), Some(&2));
	})
	.await;
}

#[tokio::test(start_paused = true)]
async fn clear_discards_the_value() {
	local(async {
		let (cache, runs) = counting(Duration::from_millis(10), options());

		assert_eq!(cache.get().await, Ok(1));
		flush().await;

		let revision = cache.revision();
		cache.clear();

		let state = cache.state();
		assert!(state.is_pending());
		assert!(state.is_stale);
		assert!(cache.revision() > revision);

		// nothing stale is left to answer a background get
		assert_eq!(cache.get_with(GetOptions::background()).await, Ok(2));
		assert_eq!(runs.get(), 2);
	})
	.await;
}

#[tokio::test(start_paused = true)]
async fn update_policies() {
	local(async {
		let (cache, runs) = counting(Duration::from_millis(10), options());

		assert_eq!(cache.get_with(GetOptions::default().update(Update::WhenMissing)).await, Ok(1));
		flush().await;

		cache.invalidate();
		assert_eq!(cache.get_with(GetOptions::default().update(Update::WhenMissing)).await, Ok(1));
		assert_eq!(runs.get(), 1);

		assert_eq!(cache.get().await, Ok(2));
		flush().await;
		assert_eq!(cache.get().await, Ok(2));
		assert_eq!(cache.get_with(GetOptions::force()).await, Ok(3));
		assert_eq!(runs.get(), 3);
	})
	.await;
}

#[tokio::test(start_paused = true)]
async fn subscribe_sees_pending_then_value() {
	local(async {
		let cache = Cache::new(|_| async { Ok(1) }, options());
		let mock = mock::SharedMock::new();
		let mut sequence = Sequence::new();

		mock.get()
			.expect_seen()
			.with(eq("pending".to_string()))
			.times(1)
			.in_sequence(&mut sequence)
			.return_const(());
		mock.get()
			.expect_seen()
			.with(eq("value 1".to_string()))
			.times(1)
			.in_sequence(&mut sequence)
			.return_const(());

		let _subscription = cache.subscribe(enclose!((mock) move |state| {
			let label = match &state.status {
				Status::Pending => "pending".to_string(),
				Status::Value(value) => format!("value {value}"),
				Status::Error(error) => format!("error {error}"),
			};
			mock.get().seen(label);
		}));

		flush().await;
		sleep(Duration::from_millis(10)).await;
		mock.get().checkpoint();
	})
	.await;
}

#[tokio::test(start_paused = true)]
async fn superseded_results_are_dropped() {
	local(async {
		let runs = Rc::new(Cell::new(0));
		let cache = Cache::new(
			enclose!((runs) move |_| {
				runs.set(runs.get() + 1);
				let run = runs.get();
				async move {
					let delay = if run == 1 { 200 } else { 50 };
					sleep(Duration::from_millis(delay)).await;
					Ok::<_, String>(run)
				}
			}),
			CacheOptions::from_registry(&Rc::new(Registry::new())),
		);

		let slow = cache.get();
		let fast = cache.get_with(GetOptions::force());
		assert!(!slow.ptr_eq(&fast));

		assert_eq!(fast.await, Ok(2));
		flush().await;
		assert_eq!(cache.state().get_value(), Some(&2));

		// the first run still resolves for whoever awaits it
		assert_eq!(slow.await, Ok(1));
		flush().await;
		assert_eq!(cache.state().get_value(), Some(&2));
		assert!(!cache.state().is_updating);
	})
	.await;
}

#[tokio::test(start_paused = true)]
async fn errors_are_states() {
	local(async {
		let cache = Cache::new(|_| async { Err::<u32, _>("offline".to_string()) }, options());

		assert_eq!(cache.get().await, Err("offline".to_string()));
		flush().await;

		let state = cache.state();
		assert_eq!(state.get_error().map(String::as_str), Some("offline"));
		assert!(!state.is_stale);
	})
	.await;
}

#[tokio::test(start_paused = true)]
async fn invalidate_after_refreshes_active_caches() {
	local(async {
		let (cache, runs) = counting(
			Duration::from_millis(10),
			options().invalidate_after(Duration::from_secs(1)),
		);

		let _subscription = cache.subscribe(|_| {});
		sleep(Duration::from_millis(20)).await;
		assert_eq!(cache.state().get_value(), Some(&1));

		sleep(Duration::from_millis(1100)).await;
		assert_eq!(cache.state().get_value(), Some(&2));
		assert_eq!(runs.get(), 2);
	})
	.await;
}

#[tokio::test(start_paused = true)]
async fn panicking_subscribers_do_not_stop_expiry() {
	local(async {
		let (cache, runs) = counting(
			Duration::from_millis(10),
			options().invalidate_after(Duration::from_millis(100)),
		);

		let _subscription = cache.subscribe(|state: &CacheState<u32, String>| {
			if state.get_value().is_some() {
				panic!("subscriber failed");
			}
		});

		sleep(Duration::from_millis(20)).await;
		assert_eq!(cache.state().get_value(), Some(&1));
		assert_eq!(cache.revision(), 1);

		sleep(Duration::from_millis(150)).await;
		assert_eq!(runs.get(), 2);
		assert_eq!(cache.revision(), 2);
		assert_eq!(cache.state().get_value(), Some(&2));
	})
	.await;
}

#[tokio::test(start_paused = true)]
async fn invalidate_after_can_depend_on_the_state() {
	local(async {
		let (cache, _) = counting(
			Duration::from_millis(10),
			options().invalidate_after_with(|state| {
				state.get_value().filter(|v| **v < 2).map(|_| Duration::from_millis(100))
			}),
		);

		assert_eq!(cache.get().await, Ok(1));
		sleep(Duration::from_millis(150)).await;
		assert!(cache.state().is_stale);

		assert_eq!(cache.get().await, Ok(2));
		sleep(Duration::from_secs(10)).await;
		assert!(!cache.state().is_stale);
	})
	.await;
}

#[tokio::test(start_paused = true)]
async fn pushes_before_and_after_settle() {
	local(async {
		let cache = Cache::new(
			|cx: CacheContext<u32, String>| {
				cx.update_value(1);
				async move {
					sleep(Duration::from_millis(100)).await;
					cx.update_value_future(async {
						sleep(Duration::from_millis(100)).await;
						Ok(3)
					});
					Ok(2)
				}
			},
			options(),
		);

		let promise = cache.get();
		let state = cache.state();
		assert_eq!(state.get_value(), Some(&1));
		assert!(state.is_updating);

		assert_eq!(promise.await, Ok(2));
		flush().await;
		let state = cache.state();
		assert_eq!(state.get_value(), Some(&2));
		assert!(!state.is_updating);

		sleep(Duration::from_millis(150)).await;
		assert_eq!(cache.state().get_value(), Some(&3));
		assert_eq!(cache.get().await, Ok(3));
	})
	.await;
}

#[tokio::test(start_paused = true)]
async fn connections_push_until_superseded() {
	local(async {
		let sink: Rc<RefCell<Option<Sink<u32, String>>>> = Rc::new(RefCell::new(None));
		let closed = Rc::new(Cell::new(0));

		let cache = Cache::new(
			enclose!((sink, closed) move |cx: CacheContext<u32, String>| {
				cx.connect(enclose!((sink, closed) move |channel| {
					*sink.borrow_mut() = Some(channel);
					move || closed.set(closed.get() + 1)
				}));
				async { Ok(0) }
			}),
			options(),
		);

		assert_eq!(cache.get().await, Ok(0));
		flush().await;
		assert!(cache.state().is_connected);

		let channel = sink.borrow().clone().expect("connected");
		assert!(channel.update_value(5));
		assert_eq!(cache.state().get_value(), Some(&5));
		assert!(channel.update_error("lost".into()));
		assert_eq!(cache.state().get_error().map(String::as_str), Some("lost"));

		cache.invalidate();
		assert_eq!(closed.get(), 1);
		assert!(!cache.state().is_connected);
		assert!(!channel.update_value(6));
		assert_eq!(cache.state().get_error().map(String::as_str), Some("lost"));
	})
	.await;
}

#[tokio::test(start_paused = true)]
async fn closing_a_sink_disconnects() {
	local(async {
		let sink: Rc<RefCell<Option<Sink<u32, String>>>> = Rc::new(RefCell::new(None));
		let cache = Cache::new(
			enclose!((sink) move |cx: CacheContext<u32, String>| {
				cx.connect(enclose!((sink) move |channel| {
					*sink.borrow_mut() = Some(channel);
					|| {}
				}));
				async { Ok(0) }
			}),
			options(),
		);

		assert_eq!(cache.get().await, Ok(0));
		flush().await;

		let channel = sink.borrow().clone().expect("connected");
		channel.close();
		assert!(!cache.state().is_connected);
	})
	.await;
}

#[tokio::test(start_paused = true)]
async fn store_reads_invalidate_the_cache() {
	local(async {
		let source = Store::new(1u32);
		let cache = Cache::new(
			enclose!((source) move |cx: CacheContext<u32, String>| {
				let value = cx.use_store(&source);
				async move { Ok(value * 10) }
			}),
			options(),
		);

		let _subscription = cache.subscribe(|_| {});
		flush().await;
		assert_eq!(cache.state().get_value(), Some(&10));

		source.set(1);
		flush().await;
		assert_eq!(cache.revision(), 1);

		source.set(2);
		flush().await;
		assert_eq!(cache.state().get_value(), Some(&20));
	})
	.await;
}

#[tokio::test(start_paused = true)]
async fn inactive_caches_leave_their_sources_idle() {
	local(async {
		let source = Store::new(1u32);
		let cache = Cache::new(
			enclose!((source) move |cx: CacheContext<u32, String>| {
				let value = cx.use_store(&source);
				async move { Ok(value * 10) }
			}),
			options(),
		);

		assert_eq!(cache.get().await, Ok(10));
		flush().await;
		assert!(!cache.is_active());
		assert!(!source.is_active());

		// the reads are checked again on the next get
		source.set(2);
		assert_eq!(cache.get().await, Ok(20));
		flush().await;

		let subscription = cache.subscribe(|_| {});
		assert!(source.is_active());

		drop(subscription);
		assert!(!source.is_active());
	})
	.await;
}

#[tokio::test(start_paused = true)]
async fn caches_follow_other_caches() {
	local(async {
		let source = Store::new(1u32);
		let base = Cache::new(
			enclose!((source) move |cx: CacheContext<u32, String>| {
				let value = cx.use_store(&source);
				async move { Ok(value) }
			}),
			options(),
		);
		let derived = Cache::new(
			enclose!((base) move |cx: CacheContext<u32, String>| {
				let base = cx.use_cache(&base);
				async move { Ok::<_, String>(base.await? * 10) }
			}),
			options(),
		);

		let _subscription = derived.subscribe(|_| {});
		flush().await;
		assert_eq!(derived.state().get_value(), Some(&10));

		source.set(2);
		flush().await;
		assert_eq!(base.state().get_value(), Some(&2));
		assert_eq!(derived.state().get_value(), Some(&20));
	})
	.await;
}

#[tokio::test(start_paused = true)]
async fn recursive_invalidation_reaches_sources() {
	local(async {
		let (base, base_runs) = counting(Duration::from_millis(10), options());
		let derived = Cache::new(
			enclose!((base) move |cx: CacheContext<u32, String>| {
				let base = cx.use_cache(&base);
				async move { Ok::<_, String>(base.await? + 100) }
			}),
			options(),
		);

		assert_eq!(derived.get().await, Ok(101));
		flush().await;

		derived.invalidate();
		assert!(!base.state().is_stale);

		assert_eq!(derived.get().await, Ok(101));
		flush().await;

		derived.invalidate_recursive();
		assert!(base.state().is_stale);
		assert!(derived.state().is_stale);

		sleep(Duration::from_millis(20)).await;
		assert_eq!(derived.get().await, Ok(102));
		assert_eq!(base_runs.get(), 2);
	})
	.await;
}

#[tokio::test(start_paused = true)]
async fn clear_on_invalidate() {
	local(async {
		let (cache, _) = counting(Duration::ZERO, options().clear_on_invalidate(true));

		assert_eq!(cache.get().await, Ok(1));
		flush().await;

		cache.invalidate();
		assert!(cache.state().is_pending());
	})
	.await;
}

#[tokio::test(start_paused = true)]
async fn invalidate_on_activation() {
	local(async {
		let (cache, runs) = counting(Duration::ZERO, options().invalidate_on_activation(true));

		assert_eq!(cache.get().await, Ok(1));
		flush().await;

		let _subscription = cache.subscribe(|_| {});
		flush().await;
		assert_eq!(runs.get(), 2);
		assert_eq!(cache.state().get_value(), Some(&2));
	})
	.await;
}

#[tokio::test(start_paused = true)]
async fn window_focus_invalidates_opted_in_caches() {
	local(async {
		let registry = Rc::new(Registry::new());
		let (focused, _) = counting(
			Duration::ZERO,
			CacheOptions::from_registry(&registry).invalidate_on_window_focus(true),
		);
		let (other, _) = counting(Duration::ZERO, CacheOptions::from_registry(&registry));

		assert_eq!(focused.get().await, Ok(1));
		assert_eq!(other.get().await, Ok(1));
		flush().await;

		registry.notify_window_focus();
		assert!(focused.state().is_stale);
		assert!(!other.state().is_stale);

		registry.all_resources().invalidate_all();
		assert!(other.state().is_stale);
	})
	.await;
}

#[tokio::test(start_paused = true)]
async fn cache_macro() {
	local(async {
		let base = Store::new(2u32);
		let doubled: Cache<u32, String> = cache!((base) cx => {
			let value = cx.use_store(&base);
			async move { Ok(value * 2) }
		});

		assert_eq!(doubled.get().await, Ok(4));
	})
	.await;
}
