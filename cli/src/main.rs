#[cfg(test)]
#[path = "main_test.rs"]
mod main_test;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{ArgAction, Args, Parser, Subcommand};
use coursehub::api::MediaFile;
use coursehub::api::types::Role;
use coursehub::catalog::{Catalog, UserDirectory, UserQuery};
use coursehub::config::{ConfigError, normalize_base_url};
use coursehub::progress::build_update;
use coursehub::storage::theme;
use coursehub::wizard::{CourseWizard, SubmitOutcome, WizardError};
use coursehub::{ApiClient, ApiError, ClientConfig, FileStore, StorageError, TokenStore};
use crop::consts::JPEG_QUALITY;
use crop::file::ImageFile;
use crop::geometry::{Layout, Size};
use crop::input::PointerEvent;
use crop::{CropError, CropWidget};
use listing::{Criteria, ListQuery, ListingError, PriceRange, SortKey};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("{}", .0.user_message())]
    Api(#[from] ApiError),
    #[error(transparent)]
    Wizard(#[from] WizardError),
    #[error(transparent)]
    Crop(#[from] CropError),
    #[error(transparent)]
    Listing(#[from] ListingError),
    #[error("failed to access {}: {source}", path.display())]
    Io { path: PathBuf, source: std::io::Error },
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "coursehub", about = "CourseHub LMS client")]
struct Cli {
    #[arg(long, env = "COURSEHUB_BASE_URL")]
    base_url: Option<String>,

    /// Local store holding the token and preferences.
    #[arg(long, env = "COURSEHUB_STORE_PATH")]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and keep the token in the local store.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "COURSEHUB_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Logout,
    Courses(CoursesCommand),
    Student(StudentCommand),
    /// Report playback progress for one video.
    Progress {
        course_id: String,
        video_id: String,
        #[arg(long)]
        watched: f64,
        #[arg(long)]
        duration: f64,
    },
    Admin(AdminCommand),
    /// Crop a local image to a square avatar JPEG.
    Avatar(AvatarArgs),
    /// Show or change the dark-mode preference.
    #[command(subcommand)]
    Theme(ThemeCommand),
}

#[derive(Args, Debug)]
struct CoursesCommand {
    #[command(subcommand)]
    command: CoursesSubcommand,
}

#[derive(Subcommand, Debug)]
enum CoursesSubcommand {
    List(CourseListArgs),
    Show {
        id: String,
    },
    Categories,
    Create(CourseFormArgs),
    Edit {
        id: String,
        #[command(flatten)]
        form: CourseFormArgs,
    },
    Delete {
        id: String,
    },
    Enroll {
        id: String,
    },
}

#[derive(Args, Debug, Default)]
struct CourseListArgs {
    #[arg(long)]
    search: Option<String>,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    level: Option<String>,
    /// `all`, `free`, `paid`, `MIN-MAX` or `MIN+`.
    #[arg(long)]
    price: Option<String>,
    #[arg(long)]
    min_rating: Option<f64>,
    #[arg(long, default_value = "newest")]
    sort: SortKey,
    #[arg(long, default_value_t = 1)]
    page: usize,
    #[arg(long, default_value_t = listing::DEFAULT_PAGE_SIZE)]
    page_size: usize,
}

impl CourseListArgs {
    fn to_query(&self) -> Result<ListQuery, CliError> {
        let price_range = match self.price.as_deref() {
            Some(raw) => PriceRange::parse_optional(raw)?,
            None => None,
        };
        Ok(ListQuery {
            criteria: Criteria {
                search: self.search.clone(),
                category: self.category.clone(),
                level: self.level.clone(),
                price_range,
                min_rating: self.min_rating,
                active: None,
            },
            sort: self.sort,
            page: self.page,
            page_size: self.page_size,
        })
    }
}

/// Course inputs. Omitted fields keep their current (or empty) value.
#[derive(Args, Debug, Default)]
struct CourseFormArgs {
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    level: Option<String>,
    #[arg(long)]
    price: Option<String>,
    #[arg(long)]
    thumbnail: Option<PathBuf>,
    #[arg(long)]
    video: Option<PathBuf>,
}

impl CourseFormArgs {
    fn apply(self, wizard: &mut CourseWizard) -> Result<(), CliError> {
        let form = wizard.form_mut();
        let fields = [
            (self.title, &mut form.title),
            (self.description, &mut form.description),
            (self.category, &mut form.category),
            (self.level, &mut form.level),
            (self.price, &mut form.price),
        ];
        for (value, slot) in fields {
            if let Some(value) = value {
                *slot = value;
            }
        }
        if let Some(path) = self.thumbnail {
            wizard.set_thumbnail(Some(read_media(&path)?));
        }
        if let Some(path) = self.video {
            wizard.set_video(Some(read_media(&path)?));
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
struct StudentCommand {
    #[command(subcommand)]
    command: StudentSubcommand,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum StudentSubcommand {
    Dashboard,
    Stats,
    Enrolled,
}

#[derive(Args, Debug)]
struct AdminCommand {
    #[command(subcommand)]
    command: AdminSubcommand,
}

#[derive(Subcommand, Debug)]
enum AdminSubcommand {
    #[command(subcommand)]
    Users(UsersSubcommand),
}

#[derive(Subcommand, Debug)]
enum UsersSubcommand {
    List(UserListArgs),
    SetRole {
        id: String,
        role: Role,
    },
    SetActive {
        id: String,
        #[arg(action = ArgAction::Set)]
        active: bool,
    },
    Delete {
        id: String,
    },
    /// Download the user CSV; printed to stdout without `--out`.
    Export {
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct UserListArgs {
    #[arg(long)]
    search: Option<String>,
    #[arg(long)]
    role: Option<Role>,
    #[arg(long)]
    active: Option<bool>,
    #[arg(long, default_value = "newest")]
    sort: SortKey,
    #[arg(long, default_value_t = 1)]
    page: usize,
    #[arg(long, default_value_t = listing::DEFAULT_PAGE_SIZE)]
    page_size: usize,
}

impl UserListArgs {
    fn to_query(&self) -> UserQuery {
        UserQuery {
            search: self.search.clone(),
            role: self.role,
            active: self.active,
            sort: self.sort,
            page: self.page,
            page_size: self.page_size,
        }
    }
}

#[derive(Args, Debug)]
struct AvatarArgs {
    input: PathBuf,
    #[arg(long, short)]
    out: PathBuf,
    /// Size the preview is laid out at, `WIDTHxHEIGHT`.
    #[arg(long, default_value = "400x400", value_parser = parse_display)]
    display: Size,
    /// Drag the selection by `DX,DY` display pixels.
    #[arg(long, value_parser = parse_offset, allow_hyphen_values = true)]
    drag: Option<Offset>,
    /// Resize the selection to this side, in display pixels.
    #[arg(long)]
    side: Option<f64>,
    /// Also print the crop as a JPEG data URL.
    #[arg(long)]
    data_url: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Offset {
    dx: f64,
    dy: f64,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum ThemeCommand {
    Show,
    On,
    Off,
    Toggle,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    init_tracing();
    let cli = Cli::parse();
    let config = resolve_config(cli.base_url.as_deref(), cli.store)?;

    match cli.command {
        Command::Login { email, password } => {
            let api = open_client(&config)?;
            let reply = api.login(&email, &password).await?;
            match reply.user {
                Some(user) => print_json(&user),
                None => {
                    eprintln!("signed in as {email}");
                    Ok(())
                }
            }
        }
        Command::Logout => {
            open_client(&config)?.logout().await?;
            eprintln!("signed out");
            Ok(())
        }
        Command::Courses(courses) => run_courses(&open_client(&config)?, courses.command).await,
        Command::Student(student) => run_student(&open_client(&config)?, student.command).await,
        Command::Progress { course_id, video_id, watched, duration } => {
            let update = build_update(watched, duration);
            open_client(&config)?.update_progress(&course_id, &video_id, &update).await?;
            print_json(&update)
        }
        Command::Admin(admin) => match admin.command {
            AdminSubcommand::Users(users) => run_users(&open_client(&config)?, users).await,
        },
        Command::Avatar(args) => run_avatar(args),
        Command::Theme(command) => run_theme(&config, command),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_config(base_url: Option<&str>, store: Option<PathBuf>) -> Result<ClientConfig, CliError> {
    let mut config = ClientConfig::from_env()?;
    if let Some(base_url) = base_url {
        config.base_url = normalize_base_url(base_url)?;
    }
    if store.is_some() {
        config.store_path = store;
    }
    Ok(config)
}

fn open_store(config: &ClientConfig) -> Result<FileStore, CliError> {
    Ok(FileStore::open(config.resolve_store_path()?)?)
}

fn open_client(config: &ClientConfig) -> Result<ApiClient, CliError> {
    let tokens = TokenStore::new(open_store(config)?);
    Ok(ApiClient::new(config, tokens)?)
}

async fn run_courses(api: &ApiClient, command: CoursesSubcommand) -> Result<(), CliError> {
    match command {
        CoursesSubcommand::List(args) => {
            let query = args.to_query()?;
            let mut catalog = Catalog::new(Arc::new(api.clone()));
            catalog.load().await?;
            print_json(&catalog.query(&query))
        }
        CoursesSubcommand::Show { id } => print_json(&api.course(&id).await?),
        CoursesSubcommand::Categories => print_json(&api.categories().await?),
        CoursesSubcommand::Create(form) => {
            let mut wizard = CourseWizard::new();
            form.apply(&mut wizard)?;
            report_submit(&wizard.submit(api).await?)
        }
        CoursesSubcommand::Edit { id, form } => {
            let course = api.course(&id).await?;
            let mut wizard = CourseWizard::edit(&course);
            form.apply(&mut wizard)?;
            report_submit(&wizard.submit(api).await?)
        }
        CoursesSubcommand::Delete { id } => {
            api.delete_course(&id).await?;
            eprintln!("deleted course {id}");
            Ok(())
        }
        CoursesSubcommand::Enroll { id } => print_json(&api.enroll(&id).await?),
    }
}

fn report_submit(outcome: &SubmitOutcome) -> Result<(), CliError> {
    for failure in &outcome.upload_failures {
        eprintln!("warning: {} upload failed: {}", failure.field.as_str(), failure.message);
    }
    print_json(&outcome.course)
}

async fn run_student(api: &ApiClient, command: StudentSubcommand) -> Result<(), CliError> {
    match command {
        StudentSubcommand::Dashboard => print_json(&api.student_dashboard().await?),
        StudentSubcommand::Stats => print_json(&api.student_stats().await?),
        StudentSubcommand::Enrolled => print_json(&api.enrolled_courses().await?),
    }
}

async fn run_users(api: &ApiClient, command: UsersSubcommand) -> Result<(), CliError> {
    match command {
        UsersSubcommand::List(args) => {
            let mut directory = UserDirectory::new(Arc::new(api.clone()));
            directory.load().await?;
            print_json(&directory.query(&args.to_query()))
        }
        UsersSubcommand::SetRole { id, role } => {
            api.set_user_role(&id, role).await?;
            eprintln!("user {id} is now {role}");
            Ok(())
        }
        UsersSubcommand::SetActive { id, active } => {
            api.set_user_active(&id, active).await?;
            eprintln!("user {id} {}", if active { "activated" } else { "deactivated" });
            Ok(())
        }
        UsersSubcommand::Delete { id } => {
            api.delete_user(&id).await?;
            eprintln!("deleted user {id}");
            Ok(())
        }
        UsersSubcommand::Export { out } => {
            let csv = api.export_users_csv().await?;
            match out {
                Some(path) => {
                    write_file(&path, &csv)?;
                    eprintln!("wrote {} bytes to {}", csv.len(), path.display());
                }
                None => print!("{}", String::from_utf8_lossy(&csv)),
            }
            Ok(())
        }
    }
}

fn run_avatar(args: AvatarArgs) -> Result<(), CliError> {
    let mut widget = CropWidget::new();
    widget.select_image(ImageFile::from_path(&args.input)?)?;
    let mut region = widget.on_layout(Layout::at_origin(args.display))?;

    if let Some(offset) = args.drag {
        let (cx, cy) = (region.x + region.width / 2.0, region.y + region.height / 2.0);
        if widget.begin_drag(&PointerEvent::mouse(cx, cy)) {
            region = widget
                .on_pointer_move(&PointerEvent::mouse(cx + offset.dx, cy + offset.dy))
                .unwrap_or(region);
        }
        widget.end_gesture();
    }
    if let Some(side) = args.side {
        let (hx, hy) = (region.right(), region.bottom());
        let delta = side - region.side();
        if widget.begin_resize(&PointerEvent::mouse(hx, hy)) {
            region = widget
                .on_pointer_move(&PointerEvent::mouse(hx + delta, hy + delta))
                .unwrap_or(region);
        }
        widget.end_gesture();
    }

    let rendered = widget.render()?;
    let jpeg = crop::export::encode_jpeg(&rendered.large, JPEG_QUALITY)?;
    write_file(&args.out, &jpeg)?;
    info!(
        x = region.x,
        y = region.y,
        side = region.side(),
        source_width = rendered.source.width,
        "avatar cropped"
    );
    eprintln!(
        "cropped {}x{} at ({}, {}) to {}",
        rendered.source.width,
        rendered.source.height,
        rendered.source.x,
        rendered.source.y,
        args.out.display()
    );

    if args.data_url {
        println!("{}", widget.confirm()?);
    }
    Ok(())
}

fn run_theme(config: &ClientConfig, command: ThemeCommand) -> Result<(), CliError> {
    let mut store = open_store(config)?;
    let dark = match command {
        ThemeCommand::Show => theme::dark_mode(&store),
        ThemeCommand::On | ThemeCommand::Off => {
            let dark = matches!(command, ThemeCommand::On);
            theme::set_dark_mode(&mut store, dark)?;
            dark
        }
        ThemeCommand::Toggle => theme::toggle_dark_mode(&mut store)?,
    };
    println!("{}", if dark { "dark" } else { "light" });
    Ok(())
}

fn read_media(path: &Path) -> Result<MediaFile, CliError> {
    MediaFile::from_path(path).map_err(|source| CliError::Io { path: path.to_owned(), source })
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), CliError> {
    std::fs::write(path, bytes).map_err(|source| CliError::Io { path: path.to_owned(), source })
}

fn parse_display(raw: &str) -> Result<Size, String> {
    let (width, height) = raw
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got `{raw}`"))?;
    let width: f64 = width.trim().parse().map_err(|_| format!("invalid width `{width}`"))?;
    let height: f64 = height.trim().parse().map_err(|_| format!("invalid height `{height}`"))?;
    let size = Size::new(width, height);
    if size.is_usable() { Ok(size) } else { Err(format!("display size `{raw}` is empty")) }
}

fn parse_offset(raw: &str) -> Result<Offset, String> {
    let (dx, dy) = raw
        .split_once(',')
        .ok_or_else(|| format!("expected DX,DY, got `{raw}`"))?;
    let dx: f64 = dx.trim().parse().map_err(|_| format!("invalid dx `{dx}`"))?;
    let dy: f64 = dy.trim().parse().map_err(|_| format!("invalid dy `{dy}`"))?;
    Ok(Offset { dx, dy })
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
