//! In-process request de-duplication.

// crates.io
use async_lock::OnceCell;
// self
use crate::_prelude::*;

type Flight<T> = Arc<OnceCell<Result<T>>>;

/// Runs at most one operation per key at a time and shares its result with every caller that
/// arrived while it was running.
///
/// The registration is dropped as soon as the operation settles, so the next call for the same
/// key starts a new flight. If the caller driving a flight is cancelled, one of the waiting
/// callers takes over with its own operation.
pub struct SingleFlight<K, T> {
	flights: Mutex<HashMap<K, Flight<T>>>,
}
impl<K, T> SingleFlight<K, T>
where
	K: Clone + Eq + Hash,
	T: Clone,
{
	/// Joins the flight for `key`, starting it with `op` when none is running.
	pub async fn run<F, Fut>(&self, key: K, op: F) -> Result<T>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let flight = self
			.flights
			.lock()
			.entry(key.clone())
			.or_insert_with(|| Arc::new(OnceCell::new()))
			.clone();
		let registered = &flight;
		let key = &key;

		flight
			.get_or_init(|| async move {
				let result = op().await;

				self.settle(key, registered);

				result
			})
			.await
			.clone()
	}

	/// Number of keys with a registered flight.
	pub fn in_flight(&self) -> usize {
		self.flights.lock().len()
	}

	fn settle(&self, key: &K, flight: &Flight<T>) {
		let mut flights = self.flights.lock();

		if flights.get(key).is_some_and(|current| Arc::ptr_eq(current, flight)) {
			flights.remove(key);
		}
	}
}
impl<K, T> Default for SingleFlight<K, T> {
	fn default() -> Self {
		Self { flights: Mutex::new(HashMap::new()) }
	}
}
impl<K, T> Debug for SingleFlight<K, T> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SingleFlight").field("in_flight", &self.flights.lock().len()).finish()
	}
}
