//! Five priority lanes with fixed timeout and concurrency budgets.
//!
//! Higher lanes always dequeue first; each lane caps its own concurrency so
//! background work cannot starve customer-facing work.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

/// Execution lane: priority, default timeout and concurrency cap.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Lane {
    Critical,
    High,
    Normal,
    Low,
    Background,
}

impl Lane {
    /// All lanes, most urgent first.
    pub const ALL: [Lane; 5] = [
        Lane::Critical,
        Lane::High,
        Lane::Normal,
        Lane::Low,
        Lane::Background,
    ];

    /// Priority order (lower = higher priority).
    pub fn priority(&self) -> u8 {
        match self {
            Lane::Critical => 0,
            Lane::High => 1,
            Lane::Normal => 2,
            Lane::Low => 3,
            Lane::Background => 4,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        let minutes = match self {
            Lane::Critical => 2,
            Lane::High => 5,
            Lane::Normal => 15,
            Lane::Low => 30,
            Lane::Background => 60,
        };
        Duration::from_secs(minutes * 60)
    }

    pub fn max_concurrent(&self) -> usize {
        match self {
            Lane::Critical => 50,
            Lane::High => 30,
            Lane::Normal => 15,
            Lane::Low => 8,
            Lane::Background => 5,
        }
    }

    /// One lane more urgent (Critical stays Critical).
    pub fn raised(&self) -> Lane {
        Lane::ALL[self.priority().saturating_sub(1) as usize]
    }

    /// The more urgent of two lanes.
    pub fn most_urgent(self, other: Lane) -> Lane {
        if other.priority() < self.priority() { other } else { self }
    }

    /// Case-insensitive lane name.
    pub fn parse(name: &str) -> Option<Lane> {
        match name.trim().to_ascii_lowercase().as_str() {
            "critical" => Some(Lane::Critical),
            "high" => Some(Lane::High),
            "normal" => Some(Lane::Normal),
            "low" => Some(Lane::Low),
            "background" => Some(Lane::Background),
            _ => None,
        }
    }
}

impl std::fmt::Display for Lane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lane::Critical => write!(f, "critical"),
            Lane::High => write!(f, "high"),
            Lane::Normal => write!(f, "normal"),
            Lane::Low => write!(f, "low"),
            Lane::Background => write!(f, "background"),
        }
    }
}

/// Selected work handed to delivery.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LaneTask {
    /// Unique task ID.
    pub id: String,
    pub lane: Lane,
    pub site_id: String,
    pub job_type: String,
    /// Leads selected for this run, oldest first.
    pub lead_ids: Vec<String>,
    pub timeout: Duration,
    pub queued_at: DateTime<Utc>,
}

impl LaneTask {
    pub fn new(lane: Lane, site_id: &str, job_type: &str, lead_ids: Vec<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            lane,
            site_id: site_id.to_string(),
            job_type: job_type.to_string(),
            lead_ids,
            timeout: lane.default_timeout(),
            queued_at: Utc::now(),
        }
    }
}

/// FIFO for one lane plus its in-flight count.
struct LaneQueue {
    lane: Lane,
    waiting: VecDeque<LaneTask>,
    in_flight: usize,
    completed: u64,
}

impl LaneQueue {
    fn new(lane: Lane) -> Self {
        Self {
            lane,
            waiting: VecDeque::new(),
            in_flight: 0,
            completed: 0,
        }
    }

    /// Front task, if the lane has a free slot.
    fn take(&mut self) -> Option<LaneTask> {
        if self.in_flight >= self.lane.max_concurrent() {
            return None;
        }
        let task = self.waiting.pop_front()?;
        self.in_flight += 1;
        Some(task)
    }

    fn release(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.completed += 1;
    }
}

/// Priority queue over the five lanes. A lane at its cap is passed over, so a
/// full critical lane does not stall high-lane work.
pub struct LaneScheduler {
    queues: Mutex<Vec<LaneQueue>>,
}

impl LaneScheduler {
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(Lane::ALL.iter().map(|l| LaneQueue::new(*l)).collect()),
        }
    }

    pub async fn submit(&self, task: LaneTask) {
        let mut queues = self.queues.lock().await;
        let queue = &mut queues[task.lane.priority() as usize];
        tracing::debug!(
            "📥 [{}] {} lane: task {} with {} leads ({} waiting, {} in flight)",
            task.site_id,
            task.lane,
            task.id,
            task.lead_ids.len(),
            queue.waiting.len(),
            queue.in_flight
        );
        queue.waiting.push_back(task);
    }

    /// Most urgent runnable task, or None when every lane is empty or capped.
    pub async fn next(&self) -> Option<LaneTask> {
        self.queues.lock().await.iter_mut().find_map(LaneQueue::take)
    }

    /// Removes every waiting task, most urgent lane first. In-flight slots are
    /// left alone.
    pub async fn drain(&self) -> Vec<LaneTask> {
        self.queues
            .lock()
            .await
            .iter_mut()
            .flat_map(|q| q.waiting.drain(..))
            .collect()
    }

    /// Frees the slot taken by a finished task.
    pub async fn complete(&self, lane: Lane) {
        self.queues.lock().await[lane.priority() as usize].release();
    }

    pub async fn stats(&self) -> Vec<LaneStats> {
        self.queues
            .lock()
            .await
            .iter()
            .map(|q| LaneStats {
                lane: q.lane,
                queued: q.waiting.len(),
                in_flight: q.in_flight,
                max_concurrent: q.lane.max_concurrent(),
                completed: q.completed,
            })
            .collect()
    }

    /// Waiting plus in-flight tasks across all lanes.
    pub async fn total_pending(&self) -> usize {
        self.queues
            .lock()
            .await
            .iter()
            .map(|q| q.waiting.len() + q.in_flight)
            .sum()
    }
}

impl Default for LaneScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct LaneStats {
    pub lane: Lane,
    pub queued: usize,
    pub in_flight: usize,
    pub max_concurrent: usize,
    pub completed: u64,
}
