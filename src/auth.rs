use crate::database::UserDb;
use crate::log_error;
use crate::model::User;
use actix_identity::{Identity, IdentityExt};
use actix_session::Session;
use actix_web::{dev::Payload, error, web, FromRequest, HttpMessage, HttpRequest};
use log::warn;
use std::future::{ready, Ready};

/// The logged in user of this request, if any.
///
/// Resolved from the identity stored in the session cookie on every request.
/// A cookie naming a user that no longer exists is treated as anonymous.
#[derive(Debug)]
pub struct CurrentUser(pub Option<(u64, User)>);

impl CurrentUser {
    pub fn id(&self) -> Option<u64> {
        self.0.as_ref().map(|(id, _)| *id)
    }

    pub fn user(&self) -> Option<&User> {
        self.0.as_ref().map(|(_, user)| user)
    }
}

impl FromRequest for CurrentUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(load_current_user(req))
    }
}

fn load_current_user(req: &HttpRequest) -> actix_web::Result<CurrentUser> {
    let identity = match req.get_identity().ok().and_then(|id| id.id().ok()) {
        Some(identity) => identity,
        None => return Ok(CurrentUser(None)),
    };
    let user_id: u64 = match identity.parse() {
        Ok(user_id) => user_id,
        Err(_) => {
            warn!("Ignoring malformed identity: {:?}", identity);
            return Ok(CurrentUser(None));
        }
    };
    let db = req
        .app_data::<web::Data<sled::Db>>()
        .ok_or_else(|| error::ErrorInternalServerError("Database error"))?;
    let user = db
        .get_user(user_id)
        .map_err(|err| log_error(err, "Database error"))?;
    if user.is_none() {
        warn!("Session refers to unknown user {}", user_id);
    }
    Ok(CurrentUser(user.map(|user| (user_id, user))))
}

pub fn sign_in(req: &HttpRequest, user_id: u64) -> actix_web::Result<()> {
    Identity::login(&req.extensions(), user_id.to_string())
        .map_err(|err| log_error(err, "Session error"))?;
    Ok(())
}

pub fn sign_out(identity: Identity) {
    identity.logout();
}

/// bcrypt only reads this many bytes of a password and ignores the rest.
pub const MAX_PASSWORD_BYTES: usize = 72;

/// Cheapest cost bcrypt accepts, keeps the tests fast.
#[cfg(test)]
pub const TEST_COST: u32 = 4;

/// Salted bcrypt hashing, run on the blocking thread pool.
///
/// Passwords longer than [`MAX_PASSWORD_BYTES`] are refused by `hash` and
/// never verify, so a shared 72 byte prefix is not enough to log in.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        PasswordHasher { cost }
    }

    pub async fn hash(&self, password: String) -> actix_web::Result<String> {
        if password.len() > MAX_PASSWORD_BYTES {
            return Err(error::ErrorBadRequest("Password too long"));
        }
        let cost = self.cost;
        web::block(move || bcrypt::hash(password, cost))
            .await
            .map_err(|err| log_error(err, "Hashing error"))?
            .map_err(|err| log_error(err, "Hashing error"))
    }

    pub async fn verify(&self, password: String, hash: String) -> actix_web::Result<bool> {
        if password.len() > MAX_PASSWORD_BYTES {
            return Ok(false);
        }
        web::block(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|err| log_error(err, "Verification error"))?
            .map_err(|err| log_error(err, "Verification error"))
    }
}

const FLASHES: &str = "_flashes";

/// Queues a message for the next rendered page.
pub fn flash(session: &Session, message: &str) -> actix_web::Result<()> {
    let mut messages: Vec<String> = session
        .get(FLASHES)
        .map_err(|err| log_error(err, "Session error"))?
        .unwrap_or_default();
    messages.push(message.to_owned());
    session
        .insert(FLASHES, messages)
        .map_err(|err| log_error(err, "Session error"))
}

pub fn take_flashes(session: &Session) -> Vec<String> {
    session
        .remove_as::<Vec<String>>(FLASHES)
        .and_then(Result::ok)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_rt::test]
    async fn hash_is_salted_and_verifiable() {
        let hasher = PasswordHasher::new(TEST_COST);
        let first = hasher.hash("pw1".to_owned()).await.unwrap();
        let second = hasher.hash("pw1".to_owned()).await.unwrap();

        assert_ne!(first, "pw1");
        assert_ne!(first, second);
        assert!(hasher.verify("pw1".to_owned(), first.clone()).await.unwrap());
        assert!(!hasher.verify("pw2".to_owned(), first).await.unwrap());
    }

    #[actix_rt::test]
    async fn overlong_passwords_are_refused() {
        let hasher = PasswordHasher::new(TEST_COST);
        let base = "a".repeat(MAX_PASSWORD_BYTES);
        let hash = hasher.hash(base.clone()).await.unwrap();

        assert!(hasher.verify(base.clone(), hash.clone()).await.unwrap());
        assert!(!hasher
            .verify(format!("{}WRONG", base), hash)
            .await
            .unwrap());
        assert!(hasher.hash(format!("{}b", base)).await.is_err());
    }

    #[actix_rt::test]
    async fn garbage_hash_is_an_error() {
        let hasher = PasswordHasher::new(TEST_COST);
        assert!(hasher
            .verify("pw1".to_owned(), "not-a-hash".to_owned())
            .await
            .is_err());
    }
}
