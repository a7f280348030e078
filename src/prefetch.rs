//! Prefetch scheduler: keeps a window of pages warm around the reader.
//!
//! Awaiting is asymmetric. The current page is always awaited because its
//! classification decides the layout. In double mode the nearest forward
//! page is awaited too, since pairing needs its classification before the
//! renderer runs. Every other page in the window is scheduled and left to
//! complete in the background.

use tracing::debug;

use crate::page_cache::PageCache;
use crate::preferences::LayoutMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefetchStep {
    Await(usize),
    Schedule(usize),
}

impl PrefetchStep {
    pub fn index(self) -> usize {
        match self {
            Self::Await(i) | Self::Schedule(i) => i,
        }
    }
}

/// Ordered fetch steps for one window.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PrefetchPlan {
    pub steps: Vec<PrefetchStep>,
}

impl PrefetchPlan {
    pub fn awaited(&self) -> Vec<usize> {
        self.steps
            .iter()
            .filter_map(|s| match s {
                PrefetchStep::Await(i) => Some(*i),
                PrefetchStep::Schedule(_) => None,
            })
            .collect()
    }

    pub fn scheduled(&self) -> Vec<usize> {
        self.steps
            .iter()
            .filter_map(|s| match s {
                PrefetchStep::Schedule(i) => Some(*i),
                PrefetchStep::Await(_) => None,
            })
            .collect()
    }

    pub fn indices(&self) -> Vec<usize> {
        self.steps.iter().map(|s| s.index()).collect()
    }
}

/// Plan the window around `current`.
///
/// `last_probe` is the highest index the forward window may touch. Callers
/// pass `max(book_count, cached_count)`, one past the last known page, so a
/// book whose info under-reports its length is discovered page by page.
pub fn plan_window(
    current: usize,
    layout: LayoutMode,
    radius: usize,
    last_probe: usize,
) -> PrefetchPlan {
    let mut steps = vec![PrefetchStep::Await(current)];

    let forward = radius.saturating_add(layout.forward_extra());
    for offset in 1..=forward {
        let index = match current.checked_add(offset) {
            Some(index) if index <= last_probe => index,
            _ => break,
        };
        if offset == 1 && layout == LayoutMode::Double {
            steps.push(PrefetchStep::Await(index));
        } else {
            steps.push(PrefetchStep::Schedule(index));
        }
    }

    for offset in 1..=radius {
        match current.checked_sub(offset) {
            Some(index) => steps.push(PrefetchStep::Schedule(index)),
            None => break,
        }
    }

    PrefetchPlan { steps }
}

/// Executes prefetch plans against the page cache.
#[derive(Clone)]
pub struct PrefetchScheduler {
    cache: PageCache,
}

impl PrefetchScheduler {
    pub fn new(cache: PageCache) -> Self {
        Self { cache }
    }

    /// Plan and run the window. Returns once every awaited page has settled.
    pub async fn load_window(
        &self,
        current: usize,
        layout: LayoutMode,
        radius: usize,
        last_probe: usize,
    ) -> PrefetchPlan {
        let plan = plan_window(current, layout, radius, last_probe);
        debug!(
            page = current,
            awaited = ?plan.awaited(),
            scheduled = ?plan.scheduled(),
            "Prefetch window"
        );

        for step in &plan.steps {
            match *step {
                PrefetchStep::Await(index) => {
                    self.cache.await_fetch(index).await;
                }
                PrefetchStep::Schedule(index) => self.cache.schedule_fetch(index),
            }
        }
        plan
    }
}
