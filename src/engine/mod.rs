mod availability;
mod error;
mod mutations;
mod policy;
mod queries;

pub use error::EngineError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};

use crate::model::*;
use crate::wal::Wal;

pub type SharedUnitCalendar = Arc<RwLock<UnitCalendar>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task owning the WAL. Appends arriving while an fsync would be
/// pending are batched into one flush (group commit); control commands are
/// handled between batches.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let mut pending = Vec::new();
        let mut control_cmd = None;

        match cmd {
            WalCommand::Append { event, response } => {
                pending.push((event, response));
                // Fold everything already queued into the same fsync.
                while let Ok(next) = rx.try_recv() {
                    match next {
                        WalCommand::Append { event, response } => {
                            pending.push((event, response));
                        }
                        other => {
                            control_cmd = Some(other);
                            break;
                        }
                    }
                }
            }
            other => control_cmd = Some(other),
        }

        if !pending.is_empty() {
            flush_pending(&mut wal, pending);
        }
        if let Some(cmd) = control_cmd {
            handle_control(&mut wal, cmd);
        }
    }
}

fn flush_pending(wal: &mut Wal, pending: Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(pending.len() as f64);
    let started = std::time::Instant::now();

    let mut result = Ok(());
    for (event, _) in &pending {
        if let Err(e) = wal.append_buffered(event) {
            result = Err(e);
            break;
        }
    }
    // Flush even after an append error so partially buffered bytes don't
    // leak into the next batch (these callers are all told the batch failed).
    let flush_result = wal.flush_sync();
    if result.is_ok() {
        result = flush_result;
    }

    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());

    for (_, tx) in pending {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_control(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched above"),
    }
}

// ── Engine ───────────────────────────────────────────────

/// The availability and allocation engine plus its backing stores.
///
/// Availability has exactly one source of truth: the confirmed stays on each
/// unit's calendar. There is no available-rooms counter anywhere.
pub struct Engine {
    /// Room type catalog keyed by caller-assigned id.
    pub(super) catalog: DashMap<RoomTypeId, RoomType>,
    /// Per-unit calendars. The write lock on one entry is the atomicity
    /// scope for that unit's check-and-insert.
    pub(super) units: DashMap<RoomNo, SharedUnitCalendar>,
    /// Every booking ever committed, cancelled ones included.
    pub(super) bookings: DashMap<BookingId, Booking>,
    /// Lower-cased guest email → booking ids in commit order.
    pub(super) by_email: DashMap<String, Vec<BookingId>>,
    /// Next booking id to issue; monotonic, never reused.
    next_booking_id: AtomicU64,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
}

impl Engine {
    /// Open (or create) the WAL at `wal_path`, replay it, and start the
    /// group-commit writer. The storage handle is owned here — there is no
    /// process-global client.
    pub fn new(wal_path: PathBuf) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            catalog: DashMap::new(),
            units: DashMap::new(),
            bookings: DashMap::new(),
            by_email: DashMap::new(),
            next_booking_id: AtomicU64::new(1),
            wal_tx,
        };

        for event in events {
            engine.apply_replayed(event);
        }

        Ok(engine)
    }

    /// Apply one replayed event. We are the sole owner of every calendar Arc
    /// during replay, so `try_write` always succeeds without blocking; never
    /// use blocking_write here because replay may run inside a runtime.
    fn apply_replayed(&self, event: Event) {
        match event {
            Event::RoomTypeCreated { room_type } | Event::RoomTypeUpdated { room_type } => {
                self.ensure_units(&room_type);
                self.catalog.insert(room_type.id, room_type);
            }
            Event::RoomTypeDeleted { id } => {
                // Calendars and booking history stay; only the catalog
                // entry goes away.
                self.catalog.remove(&id);
            }
            Event::BookingConfirmed { booking } => {
                if booking.status == BookingStatus::Confirmed {
                    let cal = self.ensure_unit(booking.room_no);
                    cal.try_write()
                        .expect("replay: uncontended write")
                        .insert_stay(Stay {
                            booking_id: booking.booking_id,
                            range: booking.stay,
                        });
                }
                self.next_booking_id
                    .fetch_max(booking.booking_id + 1, Ordering::SeqCst);
                self.record_booking(booking);
            }
            Event::BookingCancelled { booking_id } => {
                if let Some(mut booking) = self.bookings.get_mut(&booking_id) {
                    booking.status = BookingStatus::Cancelled;
                    let room_no = booking.room_no;
                    drop(booking);
                    if let Some(cal) = self.units.get(&room_no) {
                        cal.value()
                            .clone()
                            .try_write()
                            .expect("replay: uncontended write")
                            .remove_stay(booking_id);
                    }
                }
            }
        }
    }

    /// Write an event through the group-commit writer and wait for the fsync.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub(super) fn ensure_unit(&self, room_no: RoomNo) -> SharedUnitCalendar {
        self.units
            .entry(room_no)
            .or_insert_with(|| Arc::new(RwLock::new(UnitCalendar::new(room_no))))
            .value()
            .clone()
    }

    pub(super) fn ensure_units(&self, room_type: &RoomType) {
        for &room_no in &room_type.room_numbers {
            self.ensure_unit(room_no);
        }
    }

    pub(super) fn unit(&self, room_no: RoomNo) -> Option<SharedUnitCalendar> {
        self.units.get(&room_no).map(|e| e.value().clone())
    }

    pub(super) fn room_type(&self, id: RoomTypeId) -> Result<RoomType, EngineError> {
        self.catalog
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(EngineError::RoomTypeNotFound(id))
    }

    /// Issue the next booking id: one greater than any id ever issued, safe
    /// under concurrent callers.
    pub(super) fn issue_booking_id(&self) -> BookingId {
        self.next_booking_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Index a committed booking record (booking map + email index). The
    /// unit calendar is maintained separately by the caller holding the
    /// calendar's write guard.
    pub(super) fn record_booking(&self, booking: Booking) {
        self.by_email
            .entry(booking.email.clone())
            .or_default()
            .push(booking.booking_id);
        self.bookings.insert(booking.booking_id, booking);
    }
}

/// Normalize an email for storage and lookup.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}
