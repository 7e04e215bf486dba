use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_user_request_uses_camel_case() {
        let request: CreateUserRequest = serde_json::from_str(
            r#"{"email":"a@b.io","password":"hunter22","firstName":"A","lastName":"B"}"#,
        )
        .unwrap();

        assert_eq!(request.first_name, "A");
        assert_eq!(request.last_name, "B");
    }

    #[test]
    fn test_login_request_rejects_missing_password() {
        let result: Result<LoginRequest, _> = serde_json::from_str(r#"{"email":"a@b.io"}"#);
        assert!(result.is_err());
    }
}
