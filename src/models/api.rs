use crate::errors::BrewBusinessErrCode;
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct GeneralResponse<T> {
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> GeneralResponse<T>
where
    (StatusCode, Json<GeneralResponse<T>>): IntoResponse,
{
    pub fn new(msg: impl Into<String>, data: Option<T>) -> Self {
        Self {
            msg: msg.into(),
            data,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub code: Option<u32>,
    pub message: String,
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
struct ApiEmitError<'a, E>
where
    E: std::error::Error + BrewBusinessErrCode,
{
    msg: &'a str,
    business_code: &'a Option<u32>,
    error: &'a Option<E>,
}

impl ApiError {
    fn api_error_inner<E, T>(
        status: StatusCode,
        err: Option<E>,
        msg: Option<T>,
        fallback_msg: &str,
    ) -> Self
    where
        E: std::error::Error + BrewBusinessErrCode,
        T: Into<String>,
    {
        let err_user_msg = msg.map(|m| m.into()).unwrap_or_else(|| fallback_msg.into());
        let business_code = err.as_ref().and_then(|e| e.code());
        let emit = ApiEmitError {
            msg: &err_user_msg,
            business_code: &business_code,
            error: &err,
        };
        match status.is_server_error() {
            true => tracing::error!("An api error occurred! => {emit:?}"),
            false => tracing::warn!("An api error occurred! => {emit:?}"),
        }
        Self {
            status,
            code: business_code,
            message: err_user_msg,
        }
    }
}

macro_rules! define_api_error {
    ($fn_name:ident, $http_status:expr, $fallback_msg:expr) => {
        impl ApiError {
            #[inline]
            pub fn $fn_name<E, T>(err: Option<E>, msg: Option<T>) -> Self
            where
                E: ::std::error::Error + $crate::errors::BrewBusinessErrCode,
                T: Into<String>,
            {
                Self::api_error_inner($http_status, err, msg, $fallback_msg)
            }
        }
        macro_rules! $fn_name {
            (err = $err: expr) => {
                $crate::models::api::ApiError::$fn_name(Some($err), None::<&str>)
            };
            (msg = $msg: expr) => {
                $crate::models::api::ApiError::$fn_name::<::std::convert::Infallible, _>(
                    None,
                    Some($msg),
                )
            };
            ($msg: literal) => {
                $crate::models::api::ApiError::$fn_name::<::std::convert::Infallible, _>(
                    None,
                    Some($msg),
                )
            };
            ($msg: expr) => {
                $crate::models::api::ApiError::$fn_name::<::std::convert::Infallible, _>(
                    None,
                    Some($msg),
                )
            };
            ($err: expr,$msg: expr) => {
                $crate::models::api::ApiError::$fn_name(Some($err), Some($msg))
            };
        }
        #[allow(unused_imports)]
        pub(crate) use $fn_name;
    };
}

define_api_error!(bad_request, StatusCode::BAD_REQUEST, "Bad Request");
define_api_error!(unauthorized, StatusCode::UNAUTHORIZED, "Unauthorized");
define_api_error!(forbidden, StatusCode::FORBIDDEN, "Forbidden");
define_api_error!(not_found, StatusCode::NOT_FOUND, "Not Found");
define_api_error!(
    internal,
    StatusCode::INTERNAL_SERVER_ERROR,
    "Internal Server Error"
);

macro_rules! general_json_res {
    ($msg:literal) => {
        Json(GeneralResponse::new($msg, None))
    };
    ($msg:literal, $data:expr) => {
        Json(GeneralResponse::new($msg, Some($data)))
    };
}

pub(crate) use general_json_res;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(self);
        (status, body).into_response()
    }
}

/// [`Json`] whose rejection is a 400 [`ApiError`] instead of axum's plain-text 4xx.
#[derive(Debug)]
pub struct ApiJson<T>(pub T);

impl<T> ApiJson<T>
where
    T: DeserializeOwned,
{
    /// For handlers that must authorize before looking at the body.
    pub fn from_bytes(bytes: &[u8]) -> ApiResult<Self> {
        Json::<T>::from_bytes(bytes)
            .map(|Json(value)| Self(value))
            .map_err(|rejection| bad_request!(rejection.body_text()))
    }
}

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> ApiResult<Self> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(bad_request!(rejection.body_text())),
        }
    }
}

pub mod prelude {
    pub use super::{ApiError, ApiJson, ApiResult, GeneralResponse};
    pub(crate) use crate::models::api::general_json_res;
    pub(crate) use crate::models::api::{
        bad_request, forbidden, internal, not_found, unauthorized,
    };
}
