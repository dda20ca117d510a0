use std::{process, sync::Arc};

use inkwell::{
    application::{
        admin::{AdminService, CreateGroupCommand},
        comments::CommentService,
        error::AppError,
        feed::FeedService,
        follows::FollowService,
        posts::PostService,
        repos::{
            CommentsRepo, FollowsRepo, GroupsRepo, PostsRepo, PostsWriteRepo, SessionsRepo,
            UsersRepo,
        },
        sessions::SessionService,
    },
    cache::{CacheConfig, CacheState, CacheTrigger, MemoryPageCache, PageCache},
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, AdminState, HttpState, SessionCookie},
        telemetry,
        uploads::UploadStorage,
    },
};
use tokio::try_join;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Users(args) => run_users(settings, args).await,
        config::Command::Groups(args) => run_groups(settings, args).await,
        config::Command::Sessions(args) => run_sessions(settings, args).await,
        config::Command::Migrations(args) => run_migrations(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let app = build_application_context(repositories, &settings)?;

    info!(
        target = "inkwell::serve",
        public_addr = %settings.server.public_addr,
        admin_addr = %settings.server.admin_addr,
        cache_enabled = settings.cache.enabled,
        "starting listeners"
    );

    serve_http(&settings, app.http_state, app.admin_state).await
}

async fn run_users(settings: config::Settings, args: config::UsersArgs) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let admin = admin_service(&repositories);

    match args.command {
        config::UsersCommand::Create(create) => {
            let user = admin.create_user(&create.username).await?;
            println!("Created user {} (id {})", user.username, user.id);
        }
    }
    Ok(())
}

async fn run_groups(settings: config::Settings, args: config::GroupsArgs) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let admin = admin_service(&repositories);

    match args.command {
        config::GroupsCommand::Create(create) => {
            let group = admin
                .create_group(CreateGroupCommand {
                    title: create.title,
                    slug: create.slug,
                    description: create.description,
                })
                .await?;
            println!("Created group {} (/group/{}/)", group.title, group.slug);
        }
    }
    Ok(())
}

async fn run_sessions(
    settings: config::Settings,
    args: config::SessionsArgs,
) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let admin = admin_service(&repositories);
    let sessions = session_service(&repositories, &settings);

    match args.command {
        config::SessionsCommand::Issue(issue) => {
            let user = admin.find_user(&issue.username).await?;
            let issued = sessions.issue(&user).await?;
            match issued.record.expires_at {
                Some(expires_at) => println!("Session for {} expires at {expires_at}", user.username),
                None => println!("Session for {} does not expire", user.username),
            }
            println!("{}", issued.token);
        }
    }
    Ok(())
}

async fn run_migrations(
    settings: config::Settings,
    args: config::MigrationsArgs,
) -> Result<(), AppError> {
    match args.command {
        // Connecting applies pending migrations.
        config::MigrationsCommand::Run(_) => {
            init_repositories(&settings).await?;
            println!("Database schema is up to date");
        }
    }
    Ok(())
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| {
            InfraError::configuration(
                "database url is not configured (provide --database-url or set INKWELL__DATABASE__URL)",
            )
        })
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn admin_service(repositories: &Arc<PostgresRepositories>) -> AdminService {
    let users: Arc<dyn UsersRepo> = repositories.clone();
    let groups: Arc<dyn GroupsRepo> = repositories.clone();
    AdminService::new(users, groups)
}

fn session_service(
    repositories: &Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> SessionService {
    let sessions: Arc<dyn SessionsRepo> = repositories.clone();
    let users: Arc<dyn UsersRepo> = repositories.clone();
    SessionService::new(sessions, users, settings.sessions.ttl)
}

struct ApplicationContext {
    http_state: HttpState,
    admin_state: AdminState,
}

fn build_application_context(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<ApplicationContext, AppError> {
    let users: Arc<dyn UsersRepo> = repositories.clone();
    let groups: Arc<dyn GroupsRepo> = repositories.clone();
    let posts: Arc<dyn PostsRepo> = repositories.clone();
    let post_writer: Arc<dyn PostsWriteRepo> = repositories.clone();
    let comments: Arc<dyn CommentsRepo> = repositories.clone();
    let follows: Arc<dyn FollowsRepo> = repositories.clone();

    let cache_config = CacheConfig::from(&settings.cache);
    let page_cache: Arc<dyn PageCache> = Arc::new(MemoryPageCache::new(&cache_config));
    let cache_state = cache_config.enabled.then(|| CacheState {
        config: cache_config.clone(),
        store: page_cache.clone(),
    });
    let cache_trigger = (cache_config.enabled && cache_config.flush_on_write)
        .then(|| CacheTrigger::new(page_cache.clone()));

    let media = Arc::new(
        UploadStorage::new(settings.uploads.directory.clone()).map_err(InfraError::from)?,
    );

    let feed = Arc::new(FeedService::new(posts.clone(), groups.clone(), users.clone()));
    let post_service = Arc::new(
        PostService::new(
            posts.clone(),
            post_writer,
            groups,
            comments.clone(),
            media.clone(),
        )
        .with_cache_trigger_opt(cache_trigger),
    );
    let comment_service = Arc::new(CommentService::new(posts, comments));
    let follow_service = Arc::new(FollowService::new(follows, users));
    let sessions = Arc::new(session_service(&repositories, settings));

    let upload_body_limit = usize::try_from(settings.uploads.max_request_bytes.get())
        .map_err(|_| AppError::validation("uploads.max_request_bytes exceeds platform limits"))?;

    let http_state = HttpState {
        feed,
        posts: post_service,
        comments: comment_service,
        follows: follow_service,
        sessions,
        media,
        session_cookie: SessionCookie::from(&settings.sessions),
        cache: cache_state,
        upload_body_limit,
    };

    let admin_state = AdminState {
        db: repositories,
        cache: page_cache,
    };

    Ok(ApplicationContext {
        http_state,
        admin_state,
    })
}

async fn serve_http(
    settings: &config::Settings,
    http_state: HttpState,
    admin_state: AdminState,
) -> Result<(), AppError> {
    let public_router = http::build_router(http_state);
    let admin_router = http::build_admin_router(admin_state);

    let public_listener = tokio::net::TcpListener::bind(settings.server.public_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    let admin_listener = tokio::net::TcpListener::bind(settings.server.admin_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    let public_server = axum::serve(public_listener, public_router.into_make_service());
    let admin_server = axum::serve(admin_listener, admin_router.into_make_service());

    try_join!(public_server, admin_server)
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}
