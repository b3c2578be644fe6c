//! 短 key 派生
//!
//! 加权位置校验和：对规范化后的 URL 按 Unicode 码点求 `codepoint * position`
//! （position 从 1 开始）之和，并输出为无前缀的小写十六进制字符串。
//!
//! 这不是密码学哈希，同一字符多重集的不同排列可能碰撞。算法必须保持不变，
//! 已存储的 key 依赖它的确切输出。

use url::Url;

/// 去除首尾空白并转小写
fn fold(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// 规范化待存储的 URL
///
/// 返回空字符串表示输入为空或无法解析为带 scheme 和 host 的绝对 URL，
/// 空字符串派生出的空 key 即"非法输入"的哨兵值。
pub fn normalize_url(raw: &str) -> String {
    let folded = fold(raw);
    if folded.is_empty() {
        return String::new();
    }

    match Url::parse(&folded) {
        Ok(parsed) if !parsed.scheme().is_empty() && parsed.has_host() => folded,
        _ => String::new(),
    }
}

/// 由 URL 派生短 key
///
/// 求和使用 64 位有符号整数并按补码回绕。回绕为负数时输出 `-` 加十六进制
/// 绝对值，与历史数据保持一致。
pub fn derive_key(url: &str) -> String {
    let folded = fold(url);
    if folded.is_empty() {
        return String::new();
    }

    let sum = folded
        .chars()
        .zip(1i64..)
        .fold(0i64, |acc, (ch, position)| {
            acc.wrapping_add((ch as i64).wrapping_mul(position))
        });

    if sum < 0 {
        format!("-{:x}", sum.unsigned_abs())
    } else {
        format!("{:x}", sum)
    }
}
