use rosoku_core::market::entity::Candle;

/// 单键历史窗口的最大根数
pub const WINDOW_CAPACITY: usize = 200;

/// # Summary
/// 固定容量的 K 线滚动窗口。只追加，满员时覆盖最旧一根。
///
/// # Invariants
/// - 内存空间在初始化时一次性分配，后续不再扩容。
/// - 始终保持最近 N 根已收盘 K 线，按时间升序可取。
/// - 归富化层独占持有，外界只读。
#[derive(Debug, Clone)]
pub struct HistoryWindow {
    // 内部存储容器
    data: Vec<Candle>,
    // 最大容量
    capacity: usize,
    // 当前插入位置索引
    cursor: usize,
}

impl HistoryWindow {
    /// # Summary
    /// 创建指定容量的滚动窗口。
    ///
    /// # Arguments
    /// * `capacity`: 固定容量上限。
    ///
    /// # Returns
    /// 初始化后的 HistoryWindow 实例。
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
            cursor: 0,
        }
    }

    /// # Summary
    /// 追加一根已收盘 K 线。
    ///
    /// # Logic
    /// 1. 未满直接 push。
    /// 2. 已满则按 cursor 覆盖最旧数据并推进 (取模) cursor。
    ///
    /// # Arguments
    /// * `candle`: 待追加的 K 线。
    pub fn push(&mut self, candle: Candle) {
        if self.data.len() < self.capacity {
            self.data.push(candle);
        } else {
            self.data[self.cursor] = candle;
            self.cursor = (self.cursor + 1) % self.capacity;
        }
    }

    /// 当前窗口内的根数
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// 窗口是否为空
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// # Summary
    /// 取最新追加的一根。
    pub fn last(&self) -> Option<&Candle> {
        if self.data.is_empty() {
            return None;
        }
        if self.data.len() < self.capacity {
            self.data.last()
        } else {
            let idx = if self.cursor == 0 {
                self.capacity - 1
            } else {
                self.cursor - 1
            };
            self.data.get(idx)
        }
    }

    /// # Summary
    /// 按时间升序导出完整窗口。
    ///
    /// # Logic
    /// 1. 未满时直接克隆整个 Vec。
    /// 2. 已满时以 cursor 为界重组两段，保证升序。
    ///
    /// # Returns
    /// 时间升序的 K 线向量。
    pub fn ordered(&self) -> Vec<Candle> {
        if self.data.len() < self.capacity {
            self.data.clone()
        } else {
            let mut result = Vec::with_capacity(self.capacity);
            result.extend(self.data[self.cursor..].iter().cloned());
            result.extend(self.data[..self.cursor].iter().cloned());
            result
        }
    }
}
