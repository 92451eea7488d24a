// ==========================================
// 仓储质检核心 - 比例与容差校验
// ==========================================
// 用途: 分配 (对入库行比例) 与流转 (对分配自身比例) 共用
// 约束: 所有浮点比较带 epsilon
// ==========================================

/// 容差带校验器
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatioBand {
    epsilon: f64,
}

impl RatioBand {
    pub fn new(epsilon: f64) -> Self {
        Self {
            epsilon: epsilon.abs(),
        }
    }

    /// |actual - expected| <= tolerance
    pub fn check(&self, actual: f64, expected: f64, tolerance: f64) -> bool {
        (actual - expected).abs() <= tolerance + self.epsilon
    }

    /// 相对容差: tolerance = |expected| * pct
    pub fn check_relative(&self, actual: f64, expected: f64, pct: f64) -> bool {
        self.check(actual, expected, expected.abs() * pct)
    }

    /// actual 是否超过 limit
    pub fn exceeds(&self, actual: f64, limit: f64) -> bool {
        actual > limit + self.epsilon
    }

    /// 向上取整件数: ceil(packages * ratio)
    ///
    /// 先扣 epsilon，避免 7.0000000001 被取成 8；正数结果至少 1 件
    pub fn expected_packages_ceil(&self, packages: i64, ratio: f64) -> i64 {
        let raw = packages as f64 * ratio;
        if raw <= 0.0 {
            return 0;
        }
        ((raw - self.epsilon).ceil() as i64).max(1)
    }
}

/// 按比例折算: qty * total_part / total_qty（total_qty 为 0 时返回 0）
pub fn proportional(total_part: f64, total_qty: f64, qty: f64) -> f64 {
    if total_qty == 0.0 {
        return 0.0;
    }
    qty * total_part / total_qty
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_inclusive_edges() {
        let band = RatioBand::new(1e-6);
        // 40 单位 × 0.5 件/单位 = 20，10% = 2
        assert!(band.check_relative(22.0, 20.0, 0.10));
        assert!(band.check_relative(18.0, 20.0, 0.10));
        assert!(!band.check_relative(22.5, 20.0, 0.10));
        assert!(!band.check(5.0, 35.0, 3.5));
    }

    #[test]
    fn test_proportional_zero_total() {
        assert_eq!(proportional(50.0, 0.0, 10.0), 0.0);
        assert_eq!(proportional(50.0, 100.0, 40.0), 20.0);
    }

    #[test]
    fn test_expected_packages_rounds_up() {
        let band = RatioBand::new(1e-6);
        assert_eq!(band.expected_packages_ceil(20, 15.0 / 40.0), 8);
        assert_eq!(band.expected_packages_ceil(20, 0.35), 7);
        assert_eq!(band.expected_packages_ceil(0, 0.5), 0);
        assert_eq!(band.expected_packages_ceil(20, 1.0), 20);
    }

    #[test]
    fn test_tiny_positive_share_needs_one_package() {
        let band = RatioBand::new(1e-6);
        assert_eq!(band.expected_packages_ceil(1, 1e-7), 1);
        assert_eq!(band.expected_packages_ceil(20, 1e-9), 1);
        assert_eq!(band.expected_packages_ceil(20, 0.0), 0);
    }

    #[test]
    fn test_exceeds_ignores_float_noise() {
        let band = RatioBand::new(1e-6);
        assert!(!band.exceeds(0.1 + 0.2, 0.3));
        assert!(band.exceeds(100.01, 100.0));
    }
}
