use crate::error::{Result, SessionError};
use crate::notifications::Notification;

/// Decode one pushed text frame into a notification
pub fn decode_frame(text: &str) -> Result<Notification> {
    Notification::from_json(text).map_err(|e| SessionError::MalformedEvent(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::NotificationType;

    #[test]
    fn test_decode_pushed_notification() {
        let text = r#"{
            "id": "n-9",
            "type": "ANALYSIS_COMPLETE",
            "title": "Analysis ready",
            "message": "Income analysis for loan 42 finished",
            "metadata": {"loan_id": "42"},
            "is_read": false,
            "created_at": "2024-06-04T13:45:18.5"
        }"#;

        let notification = decode_frame(text).unwrap();
        assert_eq!(notification.id, "n-9");
        assert_eq!(notification.notification_type, NotificationType::AnalysisComplete);
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(
            decode_frame("not json"),
            Err(SessionError::MalformedEvent(_))
        ));
        assert!(matches!(
            decode_frame(r#"{"type":"pong"}"#),
            Err(SessionError::MalformedEvent(_))
        ));
    }
}
