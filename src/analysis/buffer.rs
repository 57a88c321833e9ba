//! 滑动窗口缓冲 (Sequence Buffer)
//!
//! 固定容量 `window_size`, 新向量进入时淘汰最旧的向量。
//! 首次填满时宣告一个就绪窗口, 之后每 `stride` 次追加才再宣告一次,
//! 以便独立于缓冲填充频率来控制异常评分频率。

use std::collections::VecDeque;

use ndarray::Array2;

use super::features::{FeatureVector, FEATURE_LEN};
use super::Window;

#[derive(Debug)]
pub struct SequenceBuffer {
    window_size: usize,
    stride: usize,
    buffer: VecDeque<FeatureVector>,
    /// 上次宣告就绪后的追加次数; None 表示本轮尚未填满过
    since_ready: Option<usize>,
}

impl SequenceBuffer {
    /// `window_size` 与 `stride` 至少为 1
    pub fn new(window_size: usize, stride: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            window_size,
            stride: stride.max(1),
            buffer: VecDeque::with_capacity(window_size),
            since_ready: None,
        }
    }

    /// 追加一个特征向量, 返回是否有新窗口就绪
    pub fn add(&mut self, features: FeatureVector) -> bool {
        if self.buffer.len() == self.window_size {
            self.buffer.pop_front();
        }
        self.buffer.push_back(features);

        if self.buffer.len() < self.window_size {
            return false;
        }

        match self.since_ready {
            None => {
                self.since_ready = Some(0);
                true
            }
            Some(n) if n + 1 >= self.stride => {
                self.since_ready = Some(0);
                true
            }
            Some(n) => {
                self.since_ready = Some(n + 1);
                false
            }
        }
    }

    /// 当前内容的有序快照 (最新的在最后), 形状 (len, FEATURE_LEN)
    pub fn window(&self) -> Window {
        let rows = self.buffer.len();
        Array2::from_shape_fn((rows, FEATURE_LEN), |(r, c)| self.buffer[r][c])
    }

    /// 清空缓冲与步长计数
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.since_ready = None;
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn stride(&self) -> usize {
        self.stride
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    fn vector(tag: f32) -> FeatureVector {
        let mut v = [0.0; FEATURE_LEN];
        v[0] = tag;
        v[FEATURE_LEN - 1] = -tag;
        v
    }

    #[test]
    fn test_not_ready_until_full() {
        let mut buf = SequenceBuffer::new(3, 1);
        assert!(!buf.add(vector(1.0)));
        assert!(!buf.add(vector(2.0)));
        assert!(buf.add(vector(3.0)));
        assert!(buf.add(vector(4.0)));
    }

    #[test]
    fn test_window_is_insertion_ordered_and_evicts_oldest() {
        let mut buf = SequenceBuffer::new(3, 1);
        for i in 1..=5 {
            buf.add(vector(i as f32));
        }
        let w = buf.window();
        assert_eq!(w.shape(), &[3, FEATURE_LEN]);
        assert_eq!(w.column(0).to_vec(), vec![3.0, 4.0, 5.0]);
        assert_eq!(w[[2, FEATURE_LEN - 1]], -5.0);
    }

    #[test]
    fn test_stride_throttles_readiness() {
        let mut buf = SequenceBuffer::new(4, 3);
        let ready: Vec<bool> = (0..12).map(|i| buf.add(vector(i as f32))).collect();
        // 第4次填满, 之后每3次一次: 4, 7, 10
        let idx: Vec<usize> = ready
            .iter()
            .enumerate()
            .filter(|(_, r)| **r)
            .map(|(i, _)| i + 1)
            .collect();
        assert_eq!(idx, vec![4, 7, 10]);
    }

    #[test]
    fn test_reset_clears_contents_and_stride_counter() {
        let mut buf = SequenceBuffer::new(2, 5);
        buf.add(vector(1.0));
        assert!(buf.add(vector(2.0)));
        assert!(!buf.add(vector(3.0)));

        buf.reset();
        assert!(buf.is_empty());
        assert_eq!(buf.window().nrows(), 0);
        assert!(!buf.add(vector(4.0)));
        // 重置后首次填满立即就绪, 不继承旧的步长计数
        assert!(buf.add(vector(5.0)));
    }

    #[test]
    fn test_random_sequences_keep_invariants() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);

        for _ in 0..50 {
            let window_size = rng.gen_range(1..8);
            let stride = rng.gen_range(1..6);
            let mut buf = SequenceBuffer::new(window_size, stride);
            let mut inserted: Vec<f32> = Vec::new();
            let mut adds_since_full: Option<usize> = None;

            for step in 0..200 {
                if rng.gen_bool(0.03) {
                    buf.reset();
                    inserted.clear();
                    adds_since_full = None;
                    continue;
                }

                let tag = step as f32;
                let ready = buf.add(vector(tag));
                inserted.push(tag);

                let expected_ready = if inserted.len() >= window_size {
                    let n = adds_since_full.map_or(0, |n| n + 1);
                    adds_since_full = Some(n);
                    n % stride == 0
                } else {
                    false
                };
                assert_eq!(ready, expected_ready);

                let w = buf.window();
                let expected_len = inserted.len().min(window_size);
                assert_eq!(w.nrows(), expected_len);
                let tail = &inserted[inserted.len() - expected_len..];
                assert_eq!(w.column(0).to_vec(), tail.to_vec());
            }
        }
    }
}
