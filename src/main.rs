mod auth;
mod config;
mod database;
mod forms;
mod model;
mod tmdb;


use actix_identity::{Identity, IdentityMiddleware};
use actix_session::{config::CookieContentSecurity, storage::CookieSessionStore, Session, SessionMiddleware};
use actix_web::{
    cookie::Key, error, http::header, middleware::Logger, web, App, HttpRequest, HttpResponse,
    HttpServer,
};
use auth::*;
use config::Settings;
use database::*;
use forms::*;
use log::{debug, info, warn};
use model::*;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tmdb::{LookupError, MovieLookup, TmdbClient};

type Tera = web::Data<tera::Tera>;
type Db = web::Data<sled::Db>;
type Lookup = web::Data<dyn MovieLookup>;
type Hasher = web::Data<PasswordHasher>;

const SESSION_COOKIE: &str = "watchlist-session";

const INVALID_CREDENTIALS: &str = "Invalid email or password, please try again.";
const EMAIL_TAKEN: &str =
    "You've already signed up with that email, log in instead or try with different email";
const USERNAME_TAKEN: &str = "You're already registered with this username.";
const LOGIN_REQUIRED: &str = "Please log in to manage your movies.";
const MOVIE_NOT_FOUND: &str = "Movie not found.";
const PASSWORD_TOO_LONG: &str = "Passwords can be at most 72 bytes long.";
const NO_RELEASE_YEAR: &str = "That movie has no release date yet, so it can't be added.";

fn log_error<E: std::fmt::Debug>(err: E, message: &'static str) -> error::Error {
    debug!("{:?}", err);
    error::ErrorInternalServerError(message)
}

fn lookup_failed(err: LookupError) -> error::Error {
    warn!("{}", err);
    error::ErrorBadGateway("The movie database could not be reached")
}

fn redirect(location: &str) -> HttpResponse {
    HttpResponse::Found()
        .insert_header((header::LOCATION, location))
        .finish()
}

fn render(tera: &tera::Tera, template: &str, ctx: &tera::Context) -> actix_web::Result<HttpResponse> {
    let body = tera
        .render(template, ctx)
        .map_err(|err| log_error(err, "Template error"))?;
    Ok(HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(body))
}

fn page_context(user: &CurrentUser, session: &Session) -> tera::Context {
    let mut ctx = tera::Context::new();
    if let Some(user) = user.user() {
        ctx.insert("username", &user.username);
    }
    ctx.insert("messages", &take_flashes(session));
    ctx
}

fn login_required(session: &Session) -> actix_web::Result<HttpResponse> {
    flash(session, LOGIN_REQUIRED)?;
    Ok(redirect("/login"))
}

fn conflict_message(conflict: UserConflict) -> &'static str {
    match conflict {
        UserConflict::Email => EMAIL_TAKEN,
        UserConflict::Username => USERNAME_TAKEN,
    }
}

#[derive(Deserialize)]
struct IdParams {
    id: Option<String>,
}

impl IdParams {
    /// An absent or empty `id` is `None`; anything else must be a number.
    fn parsed(&self) -> actix_web::Result<Option<u64>> {
        match self.id.as_deref() {
            None | Some("") => Ok(None),
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|_| error::ErrorBadRequest("Invalid id")),
        }
    }
}

async fn index(
    user: CurrentUser,
    session: Session,
    tera: Tera,
    db: Db,
) -> actix_web::Result<HttpResponse> {
    let mut ctx = page_context(&user, &session);
    let movies = match user.id() {
        Some(user_id) => db
            .movies_by_owner(user_id)
            .map_err(|err| log_error(err, "Database error"))?,
        None => Vec::new(),
    };
    let listed: Vec<ListedMovie> = movies
        .iter()
        .map(|(id, movie)| ListedMovie { id: *id, movie })
        .collect();
    ctx.insert("movies", &listed);
    render(&tera, "index.html", &ctx)
}

fn form_page(
    tera: &tera::Tera,
    template: &str,
    user: &CurrentUser,
    session: &Session,
    form: &FormView,
) -> actix_web::Result<HttpResponse> {
    let mut ctx = page_context(user, session);
    ctx.insert("form", form);
    render(tera, template, &ctx)
}

async fn login(user: CurrentUser, session: Session, tera: Tera) -> actix_web::Result<HttpResponse> {
    form_page(&tera, "login.html", &user, &session, &LOGIN.blank())
}

async fn login_post(
    req: HttpRequest,
    params: web::Form<HashMap<String, String>>,
    user: CurrentUser,
    session: Session,
    tera: Tera,
    db: Db,
    hasher: Hasher,
) -> actix_web::Result<HttpResponse> {
    let input = match LoginInput::parse(&params) {
        Ok(input) => input,
        Err(form) => return form_page(&tera, "login.html", &user, &session, &form),
    };
    if let Some((user_id, found)) = db
        .get_user_by_email(&input.email)
        .map_err(|err| log_error(err, "Database error"))?
    {
        if hasher.verify(input.password, found.password_hash).await? {
            sign_in(&req, user_id)?;
            info!("User {} logged in", found.username);
            return Ok(redirect("/"));
        }
    }
    warn!("Failed login attempt for {}", input.email);
    flash(&session, INVALID_CREDENTIALS)?;
    Ok(redirect("/login"))
}

async fn register(
    user: CurrentUser,
    session: Session,
    tera: Tera,
) -> actix_web::Result<HttpResponse> {
    form_page(&tera, "register.html", &user, &session, &REGISTER.blank())
}

async fn register_post(
    req: HttpRequest,
    params: web::Form<HashMap<String, String>>,
    user: CurrentUser,
    session: Session,
    tera: Tera,
    db: Db,
    hasher: Hasher,
) -> actix_web::Result<HttpResponse> {
    let input = match RegisterInput::parse(&params) {
        Ok(input) => input,
        Err(form) => return form_page(&tera, "register.html", &user, &session, &form),
    };
    if input.password.len() > MAX_PASSWORD_BYTES {
        let form = REGISTER.reject(&params, "password", PASSWORD_TOO_LONG);
        return form_page(&tera, "register.html", &user, &session, &form);
    }
    let taken = if db
        .get_user_by_email(&input.email)
        .map_err(|err| log_error(err, "Database error"))?
        .is_some()
    {
        Some(UserConflict::Email)
    } else if db
        .get_user_by_username(&input.username)
        .map_err(|err| log_error(err, "Database error"))?
        .is_some()
    {
        Some(UserConflict::Username)
    } else {
        None
    };
    if let Some(conflict) = taken {
        warn!("Registration rejected for {}: {:?} taken", input.email, conflict);
        flash(&session, conflict_message(conflict))?;
        return Ok(redirect("/register"));
    }

    let new_user = User {
        username: input.username,
        email: input.email,
        password_hash: hasher.hash(input.password).await?,
    };
    match db
        .add_user(&new_user)
        .map_err(|err| log_error(err, "Database error"))?
    {
        Ok(user_id) => {
            sign_in(&req, user_id)?;
            info!("Registered user {} ({})", new_user.username, user_id);
            Ok(redirect("/"))
        }
        // Lost a race against a concurrent registration.
        Err(conflict) => {
            flash(&session, conflict_message(conflict))?;
            Ok(redirect("/register"))
        }
    }
}

async fn logout(identity: Option<Identity>) -> HttpResponse {
    if let Some(identity) = identity {
        sign_out(identity);
    }
    redirect("/")
}

async fn add(user: CurrentUser, session: Session, tera: Tera) -> actix_web::Result<HttpResponse> {
    if user.id().is_none() {
        return login_required(&session);
    }
    form_page(&tera, "add.html", &user, &session, &FIND_MOVIE.blank())
}

async fn add_post(
    params: web::Form<HashMap<String, String>>,
    user: CurrentUser,
    session: Session,
    tera: Tera,
    lookup: Lookup,
) -> actix_web::Result<HttpResponse> {
    if user.id().is_none() {
        return login_required(&session);
    }
    let input = match FindMovieInput::parse(&params) {
        Ok(input) => input,
        Err(form) => return form_page(&tera, "add.html", &user, &session, &form),
    };
    let options = lookup.search(&input.title).await.map_err(lookup_failed)?;
    debug!("{} results for {:?}", options.len(), input.title);
    let mut ctx = page_context(&user, &session);
    ctx.insert("query", &input.title);
    ctx.insert("options", &options);
    render(&tera, "select.html", &ctx)
}

async fn find(
    params: web::Query<IdParams>,
    user: CurrentUser,
    session: Session,
    db: Db,
    lookup: Lookup,
) -> actix_web::Result<HttpResponse> {
    let owner_id = match user.id() {
        Some(owner_id) => owner_id,
        None => return login_required(&session),
    };
    let api_id = match params.parsed()? {
        Some(api_id) => api_id,
        None => return Ok(redirect("/")),
    };
    let details = lookup.details(api_id).await.map_err(lookup_failed)?;
    let title = details.title.clone();
    match details.into_movie(owner_id) {
        Some(movie) => {
            let movie_id = db
                .add_movie(&movie)
                .map_err(|err| log_error(err, "Database error"))?;
            info!("User {} added movie {} ({})", owner_id, movie_id, movie.title);
        }
        None => {
            warn!("Movie {} ({}) has no usable release date", api_id, title);
            flash(&session, NO_RELEASE_YEAR)?;
        }
    }
    Ok(redirect("/"))
}

async fn delete(
    params: web::Query<IdParams>,
    user: CurrentUser,
    session: Session,
    db: Db,
) -> actix_web::Result<HttpResponse> {
    let owner_id = match user.id() {
        Some(owner_id) => owner_id,
        None => return login_required(&session),
    };
    // Unknown, foreign and unparseable ids all read as "not found".
    let movie_id = params.parsed().ok().flatten();
    let owned = match movie_id {
        Some(movie_id) => db
            .get_movie(movie_id)
            .map_err(|err| log_error(err, "Database error"))?
            .filter(|movie| movie.owner_id == owner_id)
            .map(|_| movie_id),
        None => None,
    };
    // A concurrent delete may still win, `delete_movie` reports that as `None`.
    let deleted = match owned {
        Some(movie_id) => db
            .delete_movie(movie_id)
            .map_err(|err| log_error(err, "Database error"))?
            .map(|movie| (movie_id, movie)),
        None => None,
    };
    match deleted {
        Some((movie_id, movie)) => {
            info!("User {} deleted movie {} ({})", owner_id, movie_id, movie.title)
        }
        None => {
            warn!("User {} tried to delete {:?}", owner_id, params.id);
            flash(&session, MOVIE_NOT_FOUND)?;
        }
    }
    Ok(redirect("/"))
}

fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index))
        .route("/login", web::get().to(login))
        .route("/login", web::post().to(login_post))
        .route("/register", web::get().to(register))
        .route("/register", web::post().to(register_post))
        .route("/logout", web::get().to(logout))
        .route("/add", web::get().to(add))
        .route("/add", web::post().to(add_post))
        .route("/find", web::get().to(find))
        .route("/delete", web::get().to(delete));
}

fn session_middleware(key: Key, secure: bool) -> SessionMiddleware<CookieSessionStore> {
    SessionMiddleware::builder(CookieSessionStore::default(), key)
        .cookie_name(SESSION_COOKIE.to_owned())
        .cookie_secure(secure)
        .cookie_content_security(CookieContentSecurity::Signed)
        .build()
}

fn load_templates() -> Result<tera::Tera, tera::Error> {
    tera::Tera::new(concat!(env!("CARGO_MANIFEST_DIR"), "/templates/**/*"))
}

#[actix_rt::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("watchlist=info,actix_web=info"),
    )
    .init();

    let settings = Settings::from_env()?;
    let tera: Tera = web::Data::new(load_templates()?);
    let db: Db = web::Data::new(sled::open(&settings.database_path)?);
    let client = TmdbClient::new(
        &settings.tmdb_api_url,
        &settings.tmdb_api_key,
        settings.tmdb_timeout,
    )?;
    let lookup: Lookup = web::Data::from(Arc::new(client) as Arc<dyn MovieLookup>);
    let hasher: Hasher = web::Data::new(PasswordHasher::new(settings.bcrypt_cost));
    let key = Key::derive_from(settings.secret_key.as_bytes());
    let cookie_secure = settings.cookie_secure;

    info!(
        "Serving {} on {}",
        settings.database_path, settings.bind_address
    );
    HttpServer::new(move || {
        App::new()
            .wrap(IdentityMiddleware::default())
            .wrap(session_middleware(key.clone(), cookie_secure))
            .wrap(Logger::default())
            .app_data(tera.clone())
            .app_data(db.clone())
            .app_data(lookup.clone())
            .app_data(hasher.clone())
            .configure(routes)
    })
    .bind(&settings.bind_address)?
    .run()
    .await?;
    Ok(())
}
