use std::borrow::Cow;
use std::fmt;

/// 调用终态码。
///
/// 仅保留模拟传输层能够产生的少量取值；每个取值都对应一个稳定的字符串码，
/// 便于日志与断言按码匹配而非按文案匹配。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok,
    Cancelled,
    Unavailable,
}

impl StatusCode {
    /// 返回稳定错误码。
    pub const fn code(self) -> &'static str {
        match self {
            StatusCode::Ok => "spark.rpc.ok",
            StatusCode::Cancelled => "spark.rpc.cancelled",
            StatusCode::Unavailable => "spark.rpc.unavailable",
        }
    }
}

/// 一次调用的最终状态。
///
/// # 契约说明（What）
/// - `code` 决定调用是否成功，`message` 仅供人类阅读；
/// - [`Status::ok`] 是唯一代表成功的构造，其余构造均携带失败码。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Status {
    code: StatusCode,
    message: Cow<'static, str>,
}

impl Status {
    pub fn new(code: StatusCode, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn ok() -> Self {
        Self::new(StatusCode::Ok, "")
    }

    pub fn cancelled(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(StatusCode::Cancelled, message)
    }

    pub fn unavailable(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(StatusCode::Unavailable, message)
    }

    pub fn code(&self) -> StatusCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::Ok
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            f.write_str(self.code.code())
        } else {
            write!(f, "{}: {}", self.code.code(), self.message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code_and_message() {
        let status = Status::cancelled("call cancelled");
        assert_eq!(status.to_string(), "spark.rpc.cancelled: call cancelled");
        assert_eq!(Status::ok().to_string(), "spark.rpc.ok");
        assert!(Status::ok().is_ok());
        assert!(!status.is_ok());
    }
}
