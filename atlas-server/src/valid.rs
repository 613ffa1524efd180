use std::ops::Deref;

use async_trait::async_trait;
use axum::{
    extract::{FromRequest, Request},
    Form, Json,
};
use serde::de::DeserializeOwned;
use validator::Validate;

use atlas_slo::errors::{self, Code, WithBacktrace};

/// A body extractor that also runs `validator` rules.
#[derive(Debug)]
pub struct Valid<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for Valid<Json<T>>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = WithBacktrace;

    async fn from_request(
        req: Request,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let value = Json::<T>::from_request(req, state)
            .await
            .map_err(|err| errors::bad_request(&err.body_text()))?;
        value.deref().validate().map_err(Code::Validates)?;
        Ok(Self(value))
    }
}

#[async_trait]
impl<S, T> FromRequest<S> for Valid<Form<T>>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = WithBacktrace;

    async fn from_request(
        req: Request,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let value = Form::<T>::from_request(req, state)
            .await
            .map_err(|err| errors::bad_request(&err.body_text()))?;
        value.deref().validate().map_err(Code::Validates)?;
        Ok(Self(value))
    }
}
