//! Visibility tracker: which observers see which screens, and delivery of
//! display events to them.
//!
//! Every observer owns a bounded channel. Delivery never blocks: an
//! observer whose channel is full misses that update and is marked for
//! resync, so its next update is a full frame. Observers whose receiver
//! was dropped are disconnected on the next delivery. A delta carrying the
//! sequence number of the frame an observer last received is skipped, since
//! the observer already holds that picture.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use gridcast_core::{EngineError, Location, ObserverId, ScreenId, SharedFrameBuffer};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::event::DisplayEvent;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Subscription {
    /// Sequence number of the last event delivered
    last_sent: Option<u64>,
    /// The next delivery must be a full frame
    resync: bool,
}

#[derive(Debug)]
struct ObserverEntry {
    sender: Sender<DisplayEvent>,
    location: Option<Location>,
}

#[derive(Debug, Default)]
struct Inner {
    observers: HashMap<ObserverId, ObserverEntry>,
    screens: HashMap<ScreenId, HashMap<ObserverId, Subscription>>,
}

/// Observers entering and leaving range after a move.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Movement {
    pub entered: Vec<ScreenId>,
    pub left: Vec<ScreenId>,
}

#[derive(Debug)]
pub struct VisibilityTracker {
    radius: f64,
    buffer: usize,
    inner: RwLock<Inner>,
}

impl VisibilityTracker {
    pub fn new(radius: f64, buffer: usize) -> Self {
        Self {
            radius,
            buffer: buffer.max(1),
            inner: RwLock::new(Inner::default()),
        }
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Register an observer and return the receiving end of its event
    /// stream.
    pub fn connect(&self, observer: ObserverId, location: Option<Location>) -> Receiver<DisplayEvent> {
        let (sender, receiver) = bounded(self.buffer);
        let mut inner = self.inner.write();
        inner.observers.insert(observer, ObserverEntry { sender, location });
        info!(observer = %observer, "Observer connected");
        receiver
    }

    /// Remove an observer and all of its subscriptions.
    pub fn disconnect(&self, observer: ObserverId) -> bool {
        let mut inner = self.inner.write();
        let known = inner.observers.remove(&observer).is_some();
        for subscribers in inner.screens.values_mut() {
            subscribers.remove(&observer);
        }
        if known {
            info!(observer = %observer, "Observer disconnected");
        }
        known
    }

    pub fn is_connected(&self, observer: ObserverId) -> bool {
        self.inner.read().observers.contains_key(&observer)
    }

    pub fn location(&self, observer: ObserverId) -> Option<Location> {
        self.inner
            .read()
            .observers
            .get(&observer)
            .and_then(|o| o.location.clone())
    }

    /// Subscribe `observer` to `screen`. `snapshot`, if any, is delivered
    /// right away so the observer starts from a full picture. Returns
    /// `false` if the observer was already subscribed.
    pub fn subscribe(
        &self,
        observer: ObserverId,
        screen: ScreenId,
        snapshot: Option<&SharedFrameBuffer>,
    ) -> Result<bool, EngineError> {
        let mut inner = self.inner.write();
        let sender = inner
            .observers
            .get(&observer)
            .map(|o| o.sender.clone())
            .ok_or(EngineError::ObserverNotFound(observer))?;

        let subscribers = inner.screens.entry(screen).or_default();
        if subscribers.contains_key(&observer) {
            return Ok(false);
        }

        let mut subscription = Subscription::default();
        if let Some(frame) = snapshot {
            let event = DisplayEvent::full(screen, SharedFrameBuffer::clone(frame));
            match sender.try_send(event) {
                Ok(()) => subscription.last_sent = Some(frame.seq()),
                Err(_) => subscription.resync = true,
            }
        }
        subscribers.insert(observer, subscription);
        debug!(observer = %observer, screen = %screen, snapshot = snapshot.is_some(), "Subscribed");
        Ok(true)
    }

    pub fn unsubscribe(&self, observer: ObserverId, screen: ScreenId) -> bool {
        let mut inner = self.inner.write();
        let removed = inner
            .screens
            .get_mut(&screen)
            .is_some_and(|subs| subs.remove(&observer).is_some());
        if removed {
            debug!(observer = %observer, screen = %screen, "Unsubscribed");
        }
        removed
    }

    /// Drop every subscription to a deleted screen.
    pub fn forget_screen(&self, screen: ScreenId) {
        self.inner.write().screens.remove(&screen);
    }

    pub fn is_subscribed(&self, observer: ObserverId, screen: ScreenId) -> bool {
        self.inner
            .read()
            .screens
            .get(&screen)
            .is_some_and(|subs| subs.contains_key(&observer))
    }

    pub fn subscribers(&self, screen: ScreenId) -> Vec<ObserverId> {
        self.inner
            .read()
            .screens
            .get(&screen)
            .map(|subs| subs.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self, screen: ScreenId) -> usize {
        self.inner.read().screens.get(&screen).map_or(0, HashMap::len)
    }

    /// Call `f` for every observer subscribed to `screen`.
    pub fn for_each_subscriber(&self, screen: ScreenId, mut f: impl FnMut(ObserverId)) {
        let inner = self.inner.read();
        if let Some(subs) = inner.screens.get(&screen) {
            for observer in subs.keys() {
                f(*observer);
            }
        }
    }

    /// Record `observer`'s new position and work out which of `screens`
    /// (id, centre) it entered or left. Screens it left are unsubscribed
    /// here; the caller subscribes entered ones with a snapshot.
    pub fn update_position(
        &self,
        observer: ObserverId,
        location: Location,
        screens: impl IntoIterator<Item = (ScreenId, Location)>,
    ) -> Result<Movement, EngineError> {
        let mut inner = self.inner.write();
        let entry = inner
            .observers
            .get_mut(&observer)
            .ok_or(EngineError::ObserverNotFound(observer))?;
        entry.location = Some(location.clone());

        let mut movement = Movement::default();
        for (screen, center) in screens {
            let in_range = location
                .distance(&center)
                .is_some_and(|d| d <= self.radius);
            let subscribed = inner
                .screens
                .get(&screen)
                .is_some_and(|subs| subs.contains_key(&observer));
            match (in_range, subscribed) {
                (true, false) => movement.entered.push(screen),
                (false, true) => {
                    if let Some(subs) = inner.screens.get_mut(&screen) {
                        subs.remove(&observer);
                    }
                    movement.left.push(screen);
                }
                _ => {}
            }
        }
        if !movement.left.is_empty() {
            debug!(observer = %observer, left = movement.left.len(), "Observer left screens");
        }
        Ok(movement)
    }

    /// Fan `event` out to every subscriber of its screen. Subscribers
    /// marked for resync get a full frame of `current` instead of a delta.
    /// Returns the number of observers that received something.
    pub fn deliver(&self, event: &DisplayEvent, current: Option<&SharedFrameBuffer>) -> usize {
        let screen = event.screen();
        let mut delivered = 0;
        let mut gone = Vec::new();
        {
            let mut inner = self.inner.write();
            let Inner { observers, screens } = &mut *inner;
            let Some(subscribers) = screens.get_mut(&screen) else {
                return 0;
            };
            for (observer, subscription) in subscribers.iter_mut() {
                let Some(entry) = observers.get(observer) else {
                    gone.push(*observer);
                    continue;
                };
                let outgoing = match (subscription.resync, event, current) {
                    (false, DisplayEvent::Delta { seq, .. }, _)
                        if subscription.last_sent == Some(*seq) =>
                    {
                        continue
                    }
                    (true, DisplayEvent::Delta { .. }, Some(frame)) => {
                        DisplayEvent::full(screen, SharedFrameBuffer::clone(frame))
                    }
                    (true, DisplayEvent::Delta { .. }, None) => continue,
                    _ => event.clone(),
                };
                let seq = outgoing.seq();
                match entry.sender.try_send(outgoing) {
                    Ok(()) => {
                        subscription.last_sent = Some(seq);
                        subscription.resync = false;
                        delivered += 1;
                    }
                    Err(TrySendError::Full(_)) => {
                        if !subscription.resync {
                            debug!(observer = %observer, screen = %screen, "Observer lagging, will resync");
                        }
                        subscription.resync = true;
                    }
                    Err(TrySendError::Disconnected(_)) => gone.push(*observer),
                }
            }
        }
        for observer in gone {
            self.disconnect(observer);
        }
        delivered
    }
}
