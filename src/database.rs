use crate::model::*;
use sled::transaction::{abort, TransactionError, TransactionResult, Transactional};
use std::convert::Infallible;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("corrupt index: {0}")]
    CorruptIndex(&'static str),
}

/// Which unique column rejected a new user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserConflict {
    Email,
    Username,
}

// Big-endian so that sled's key order matches id order.
fn serialize_id(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

fn deserialize_id<V: AsRef<[u8]>>(id: V) -> Result<u64, DbError> {
    let bytes: [u8; 8] = id
        .as_ref()
        .try_into()
        .map_err(|_| DbError::CorruptIndex("id is not 8 bytes"))?;
    Ok(u64::from_be_bytes(bytes))
}

fn owner_key(owner_id: u64, movie_id: u64) -> Vec<u8> {
    let mut key = serialize_id(owner_id).to_vec();
    key.extend_from_slice(&serialize_id(movie_id));
    key
}

fn storage_error(err: TransactionError<Infallible>) -> DbError {
    match err {
        TransactionError::Storage(e) => DbError::Storage(e),
        TransactionError::Abort(never) => match never {},
    }
}

pub trait UserDb {
    type Error;
    fn add_user(&self, user: &User) -> Result<Result<u64, UserConflict>, Self::Error>;
    fn get_user(&self, id: u64) -> Result<Option<User>, Self::Error>;
    fn get_user_by_email(&self, email: &str) -> Result<Option<(u64, User)>, Self::Error>;
    fn get_user_by_username(&self, username: &str) -> Result<Option<(u64, User)>, Self::Error>;
}

pub trait MovieDb {
    type Error;
    fn add_movie(&self, movie: &Movie) -> Result<u64, Self::Error>;
    fn get_movie(&self, id: u64) -> Result<Option<Movie>, Self::Error>;
    fn movies_by_owner(&self, owner_id: u64) -> Result<Vec<(u64, Movie)>, Self::Error>;
    fn delete_movie(&self, id: u64) -> Result<Option<Movie>, Self::Error>;
}

const USERS: &[u8] = b"users";
const USERS_EMAIL: &[u8] = b"users_email";
const USERS_USERNAME: &[u8] = b"users_username";
const MOVIES: &[u8] = b"movies";
const MOVIES_OWNER: &[u8] = b"movies_owner";

impl UserDb for sled::Db {
    type Error = DbError;

    fn add_user(&self, user: &User) -> Result<Result<u64, UserConflict>, DbError> {
        let users = self.open_tree(USERS)?;
        let users_email = self.open_tree(USERS_EMAIL)?;
        let users_username = self.open_tree(USERS_USERNAME)?;
        let id = self.generate_id()?;
        let key = serialize_id(id);
        let value = bincode::serialize(user)?;
        let result: TransactionResult<(), UserConflict> = (&users, &users_email, &users_username)
            .transaction(|(users, users_email, users_username)| {
                if users_email.insert(user.email.as_bytes(), &key[..])?.is_some() {
                    return abort(UserConflict::Email);
                }
                if users_username.insert(user.username.as_bytes(), &key[..])?.is_some() {
                    return abort(UserConflict::Username);
                }
                users.insert(&key[..], value.as_slice())?;
                Ok(())
            });
        match result {
            Ok(()) => Ok(Ok(id)),
            Err(TransactionError::Abort(conflict)) => Ok(Err(conflict)),
            Err(TransactionError::Storage(e)) => Err(e.into()),
        }
    }

    fn get_user(&self, id: u64) -> Result<Option<User>, DbError> {
        let users = self.open_tree(USERS)?;
        match users.get(serialize_id(id))? {
            Some(data) => Ok(Some(bincode::deserialize(&data)?)),
            None => Ok(None),
        }
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<(u64, User)>, DbError> {
        lookup_user(self, USERS_EMAIL, email)
    }

    fn get_user_by_username(&self, username: &str) -> Result<Option<(u64, User)>, DbError> {
        lookup_user(self, USERS_USERNAME, username)
    }
}

fn lookup_user(db: &sled::Db, index: &[u8], value: &str) -> Result<Option<(u64, User)>, DbError> {
    let index = db.open_tree(index)?;
    let id = match index.get(value.as_bytes())? {
        Some(id) => deserialize_id(id)?,
        None => return Ok(None),
    };
    let user = db
        .get_user(id)?
        .ok_or(DbError::CorruptIndex("user index points to a missing user"))?;
    Ok(Some((id, user)))
}

impl MovieDb for sled::Db {
    type Error = DbError;

    fn add_movie(&self, movie: &Movie) -> Result<u64, DbError> {
        let movies = self.open_tree(MOVIES)?;
        let movies_owner = self.open_tree(MOVIES_OWNER)?;
        let id = self.generate_id()?;
        let key = serialize_id(id);
        let value = bincode::serialize(movie)?;
        let index_key = owner_key(movie.owner_id, id);
        let result: TransactionResult<(), Infallible> =
            (&movies, &movies_owner).transaction(|(movies, movies_owner)| {
                movies.insert(&key[..], value.as_slice())?;
                movies_owner.insert(index_key.as_slice(), Vec::<u8>::new())?;
                Ok(())
            });
        result.map_err(storage_error)?;
        Ok(id)
    }

    fn get_movie(&self, id: u64) -> Result<Option<Movie>, DbError> {
        let movies = self.open_tree(MOVIES)?;
        match movies.get(serialize_id(id))? {
            Some(data) => Ok(Some(bincode::deserialize(&data)?)),
            None => Ok(None),
        }
    }

    fn movies_by_owner(&self, owner_id: u64) -> Result<Vec<(u64, Movie)>, DbError> {
        let movies_owner = self.open_tree(MOVIES_OWNER)?;
        movies_owner
            .scan_prefix(serialize_id(owner_id))
            .keys()
            .map(|key| -> Result<(u64, Movie), DbError> {
                let key = key?;
                let id = deserialize_id(
                    key.get(8..)
                        .ok_or(DbError::CorruptIndex("owner index key too short"))?,
                )?;
                let movie = self
                    .get_movie(id)?
                    .ok_or(DbError::CorruptIndex("owner index points to a missing movie"))?;
                Ok((id, movie))
            })
            .collect()
    }

    fn delete_movie(&self, id: u64) -> Result<Option<Movie>, DbError> {
        let movie = match self.get_movie(id)? {
            Some(movie) => movie,
            None => return Ok(None),
        };
        let movies = self.open_tree(MOVIES)?;
        let movies_owner = self.open_tree(MOVIES_OWNER)?;
        let key = serialize_id(id);
        let index_key = owner_key(movie.owner_id, id);
        let result: TransactionResult<bool, Infallible> =
            (&movies, &movies_owner).transaction(|(movies, movies_owner)| {
                let existed = movies.remove(&key[..])?.is_some();
                movies_owner.remove(index_key.as_slice())?;
                Ok(existed)
            });
        // A concurrent delete may have won between the read and the transaction.
        if result.map_err(storage_error)? {
            Ok(Some(movie))
        } else {
            Ok(None)
        }
    }
}
