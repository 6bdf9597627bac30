use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use service_core::error::AppError;
use validator::{Validate, ValidationErrors};

/// JSON body that has passed its `validator` rules.
///
/// Malformed bodies are `400`; bodies failing a rule are `422` and name the
/// offending fields, never their values.
pub struct ValidatedJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + 'static,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(malformed_body)?;

        value.validate().map_err(|errors| {
            AppError::UnprocessableEntity(anyhow::anyhow!(
                "Invalid fields: {}",
                invalid_fields(&errors).join(", ")
            ))
        })?;

        Ok(ValidatedJson(value))
    }
}

fn malformed_body(rejection: JsonRejection) -> AppError {
    AppError::BadRequest(anyhow::anyhow!("Malformed JSON body: {}", rejection.body_text()))
}

fn invalid_fields(errors: &ValidationErrors) -> Vec<String> {
    let mut fields: Vec<String> = errors
        .field_errors()
        .keys()
        .map(|field| field.to_string())
        .collect();
    fields.sort();
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, Validate)]
    struct Signup {
        #[validate(length(min = 3))]
        handle: String,
        #[validate(email)]
        email: String,
    }

    fn json_request(body: &str) -> Request {
        axum::http::Request::builder()
            .method("POST")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn valid_body_is_extracted() {
        let req = json_request(r#"{"handle":"alice","email":"alice@example.com"}"#);
        let ValidatedJson(signup) = ValidatedJson::<Signup>::from_request(req, &())
            .await
            .unwrap();
        assert_eq!(signup.handle, "alice");
    }

    #[tokio::test]
    async fn failed_rules_name_fields_without_values() {
        let req = json_request(r#"{"handle":"al","email":"secret-not-an-email"}"#);
        let err = ValidatedJson::<Signup>::from_request(req, &())
            .await
            .err()
            .unwrap();

        let (status, message) = err.status_and_message();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(message, "Invalid fields: email, handle");
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let err = ValidatedJson::<Signup>::from_request(json_request("{not json"), &())
            .await
            .err()
            .unwrap();
        assert_eq!(err.status_and_message().0, StatusCode::BAD_REQUEST);
    }
}
