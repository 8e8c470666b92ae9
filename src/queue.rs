use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, warn};

/// 节流策略（按通道配置，可选）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottlePolicy {
    /// 最大并发任务数（None = 不限）
    pub concurrency: Option<usize>,
    /// 每个 interval 窗口内最多启动的任务数（None = 不限）
    pub interval_capacity: Option<usize>,
    /// 窗口长度（零 = 不做窗口限流）
    pub interval: Duration,
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self {
            concurrency: None,
            interval_capacity: None,
            interval: Duration::ZERO,
        }
    }
}

type Job = Box<dyn FnOnce(bool) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

struct QueueEntry {
    priority: i32,
    seq: u64,
    expire_at: Option<Instant>,
    job: Job,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // 优先级高者先出队；同优先级按到达顺序（FIFO）
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// 任务结果句柄
///
/// `None` 表示任务在获得执行机会之前 TTL 已过期，任务体从未执行。
pub struct ThrottleHandle<T> {
    rx: oneshot::Receiver<Option<T>>,
}

impl<T> Future for ThrottleHandle<T> {
    type Output = Option<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().rx)
            .poll(cx)
            .map(|res| res.unwrap_or(None))
    }
}

/// 优先级/TTL 节流队列
///
/// 通用任务调度器，对推送语义一无所知：
/// - 就绪集按优先级降序排序，同优先级 FIFO
/// - 并发槽位与窗口容量都满足时才启动下一个任务
/// - TTL 在出队时刻判定（不是入队时刻，也不含执行耗时）：
///   过期任务直接以 `None` 结算，任务体不会被调用
/// - 任务失败只影响自己的调用方，不影响兄弟任务
///
/// 调度循环是唯一触碰就绪集和槽位计数的地方，不需要加锁。
pub struct ThrottleQueue {
    tx: mpsc::UnboundedSender<QueueEntry>,
    seq: AtomicU64,
}

impl ThrottleQueue {
    pub fn new(policy: ThrottlePolicy) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(scheduler_loop(policy, rx));
        Self {
            tx,
            seq: AtomicU64::new(0),
        }
    }

    /// 入队一个任务
    ///
    /// - `ttl`: 等待槽位的最长时间，超过后任务被丢弃（结算为 `None`）
    /// - `priority`: 默认 0，越大越先执行
    pub fn enqueue<F, T>(&self, task: F, ttl: Option<Duration>, priority: i32) -> ThrottleHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel::<Option<T>>();
        let job: Job = Box::new(move |expired| {
            Box::pin(async move {
                if expired {
                    let _ = result_tx.send(None);
                } else {
                    let value = task.await;
                    let _ = result_tx.send(Some(value));
                }
            })
        });

        let entry = QueueEntry {
            priority,
            seq: self.seq.fetch_add(1, AtomicOrdering::Relaxed),
            expire_at: ttl.map(|t| Instant::now() + t),
            job,
        };

        if self.tx.send(entry).is_err() {
            warn!("[THROTTLE] scheduler is gone, task settled as dropped");
        }

        ThrottleHandle { rx: result_rx }
    }
}

async fn scheduler_loop(policy: ThrottlePolicy, mut rx: mpsc::UnboundedReceiver<QueueEntry>) {
    let mut ready: BinaryHeap<QueueEntry> = BinaryHeap::new();
    let mut running = 0usize;
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<()>();

    let interval_limited =
        policy.interval_capacity.is_some() && policy.interval > Duration::ZERO;
    let mut window_start = Instant::now();
    let mut started_in_window = 0usize;
    let mut open = true;

    loop {
        // 槽位和窗口允许的范围内，持续启动最高优先级的就绪任务
        let mut window_full = false;
        while !ready.is_empty() {
            if policy.concurrency.map_or(false, |c| running >= c) {
                break;
            }
            if interval_limited {
                let now = Instant::now();
                if now.duration_since(window_start) >= policy.interval {
                    window_start = now;
                    started_in_window = 0;
                }
                if started_in_window >= policy.interval_capacity.unwrap_or(usize::MAX) {
                    window_full = true;
                    break;
                }
            }

            let entry = match ready.pop() {
                Some(entry) => entry,
                None => break,
            };

            // TTL 在出队时刻判定；被丢弃的任务不占槽位也不占窗口容量
            if entry.expire_at.map_or(false, |t| Instant::now() > t) {
                debug!(
                    "[THROTTLE] task expired before start, dropping: priority={}, seq={}",
                    entry.priority, entry.seq
                );
                (entry.job)(true).await;
                continue;
            }

            running += 1;
            if interval_limited {
                started_in_window += 1;
            }
            let done = done_tx.clone();
            let fut = (entry.job)(false);
            tokio::spawn(async move {
                fut.await;
                let _ = done.send(());
            });
        }

        if !open && running == 0 && ready.is_empty() {
            break;
        }

        tokio::select! {
            // 先收完新任务再处理槽位释放，保证已入队的任务在槽位空出时都已就绪
            biased;
            entry = rx.recv(), if open => {
                match entry {
                    Some(entry) => ready.push(entry),
                    None => open = false,
                }
            }
            Some(()) = done_rx.recv() => {
                running -= 1;
            }
            _ = tokio::time::sleep_until(window_start + policy.interval), if window_full => {
                // 窗口到期，循环顶部会重置容量
            }
        }
    }
}
