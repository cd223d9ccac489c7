/// Identity of a clock within its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClockId(u32);

impl ClockId {
    pub fn from_index(index: u32) -> Self {
        ClockId(index)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identity of one observer subscription on one clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn from_raw(raw: u64) -> Self {
        SubscriptionId(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Which aspects of a clock were touched by one atomic mutation.
///
/// Delivered to observers as the payload of a single notification per
/// mutation, so multi-field changes (e.g. correlation and speed set
/// together) notify exactly once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeMask {
    pub correlation: bool,
    pub speed: bool,
    pub tick_rate: bool,
    pub parent: bool,
    pub availability: bool,
}

impl ChangeMask {
    pub fn correlation() -> Self {
        Self {
            correlation: true,
            ..Self::default()
        }
    }

    pub fn speed() -> Self {
        Self {
            speed: true,
            ..Self::default()
        }
    }

    pub fn tick_rate() -> Self {
        Self {
            tick_rate: true,
            ..Self::default()
        }
    }

    pub fn parent() -> Self {
        Self {
            parent: true,
            ..Self::default()
        }
    }

    pub fn availability() -> Self {
        Self {
            availability: true,
            ..Self::default()
        }
    }

    pub fn union(self, other: Self) -> Self {
        Self {
            correlation: self.correlation || other.correlation,
            speed: self.speed || other.speed,
            tick_rate: self.tick_rate || other.tick_rate,
            parent: self.parent || other.parent,
            availability: self.availability || other.availability,
        }
    }

    pub fn any(self) -> bool {
        self.correlation || self.speed || self.tick_rate || self.parent || self.availability
    }
}

/// Observer of clock mutations.
///
/// Subscribed to a clock with `bind()`; receives one call per atomic
/// mutation of that clock or any of its ancestors. The graph holds the
/// observer weakly and invokes it after the graph lock is released, so
/// implementations may query clock state freely. They must not assume
/// any ordering across different clocks.
pub trait ClockObserver: Send + Sync {
    /// `clock` is the subscribed clock (not necessarily the mutated
    /// ancestor); `mask` describes what changed on the mutated clock.
    fn clock_changed(&self, clock: ClockId, mask: ChangeMask);
}
