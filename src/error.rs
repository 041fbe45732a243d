use gotham::helpers::http::response::create_response;
use gotham::state::State;
use hyper::header::InvalidHeaderValue;
use hyper::{Body, Response, StatusCode};
use serde_json::json;
use thiserror::Error;
use tracing::{error, info};

use crate::store::StoreError;

/// Everything that can go wrong while answering a request. The `Display`
/// text is what the client sees; internal causes stay in `source()`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Nome é obrigatório.")]
    MissingName,
    #[error("Resposta inválida.")]
    InvalidAttendance,
    #[error("Corpo da requisição inválido.")]
    MalformedBody(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Senha inválida.")]
    WrongPassword,
    #[error("Acesso não autorizado ao relatório.")]
    Unauthorized,
    #[error("Erro ao salvar confirmação.")]
    SaveFailed(#[source] StoreError),
    #[error("Erro ao gerar relatório.")]
    ReportFailed(#[source] StoreError),
    #[error("Erro ao gerar página.")]
    Render(#[source] std::io::Error),
    #[error("Erro inesperado.")]
    Header(#[from] InvalidHeaderValue),
    #[error("Erro inesperado.")]
    Serialize(#[from] serde_json::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        use Error::*;
        match self {
            MissingName | InvalidAttendance | MalformedBody(..) => StatusCode::BAD_REQUEST,
            WrongPassword | Unauthorized => StatusCode::UNAUTHORIZED,
            SaveFailed(..) | ReportFailed(..) | Render(..) | Header(..) | Serialize(..) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn as_response(&self, state: &State) -> Response<Body> {
        let status = self.status_code();
        if status.is_server_error() {
            match std::error::Error::source(self) {
                Some(cause) => error!(%status, "{}: {}", self, cause),
                None => error!(%status, "{}", self),
            }
        } else {
            info!(%status, "rejected request: {}", self);
        }
        create_response(
            state,
            status,
            mime::APPLICATION_JSON,
            json!({ "error": self.to_string() }).to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_4xx() {
        assert_eq!(Error::MissingName.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::InvalidAttendance.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::WrongPassword.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(Error::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn storage_failures_do_not_leak_their_cause() {
        let err = Error::SaveFailed(StoreError::Poisoned);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Erro ao salvar confirmação.");
        assert!(std::error::Error::source(&err).is_some());
    }
}
