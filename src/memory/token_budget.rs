//! Token 估算
//!
//! 会话记忆的淘汰与运行级 token 预算都基于同一个估算器，不依赖具体模型的分词器。

/// Token 估算器（简单的字符计数近似）
pub struct TokenEstimator;

impl TokenEstimator {
    /// 估算文本的 token 数量
    /// 使用简单的启发式规则：英文约 4 字符/token，中文约 1.5 字符/token；非空文本至少 1
    pub fn estimate(text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        let mut ascii_chars = 0;
        let mut non_ascii_chars = 0;

        for c in text.chars() {
            if c.is_ascii() {
                ascii_chars += 1;
            } else {
                non_ascii_chars += 1;
            }
        }

        let tokens = ascii_chars / 4 + (non_ascii_chars as f64 / 1.5).ceil() as usize;
        tokens.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_estimator_english() {
        let text = "Hello, world! This is a test.";
        let tokens = TokenEstimator::estimate(text);
        assert!(tokens > 0);
        assert!(tokens < text.len());
    }

    #[test]
    fn test_token_estimator_chinese() {
        let text = "你好世界，这是一个测试。";
        assert!(TokenEstimator::estimate(text) > 0);
    }

    #[test]
    fn test_four_ascii_chars_is_one_token() {
        assert_eq!(TokenEstimator::estimate("1111"), 1);
        assert_eq!(TokenEstimator::estimate("a"), 1);
        assert_eq!(TokenEstimator::estimate(""), 0);
    }
}
