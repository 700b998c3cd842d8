use clap::{Args as ClapArgs, Parser, Subcommand};
use dotenv::dotenv;
use tracing_subscriber::EnvFilter;

use std::error::Error as StdError;
use std::sync::Arc;

use lms_client::api::{Api, ListQuery};
use lms_client::attachments::{Attachment, LessonAttachments};
use lms_client::badge::Badge;
use lms_client::course::{Course, LessonId};
use lms_client::entity::Entity;
use lms_client::post::Post;
use lms_client::prefs::{PrefsStore, SavedFilter};
use lms_client::resource::{Resource, Scope};
use lms_client::user::UserParam;
use lms_client::{Client, Config, LoadMode, SortKey, Store, ViewState};

/// Browse a learning-management site from the terminal.
#[derive(Parser, Debug)]
#[command(name = "lms-client", about = "Browse courses, resources, posts and badges")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Uploaded study resources
    Resources {
        #[command(flatten)]
        filter: FilterArgs,
        /// Show which resources are attached to this lesson
        #[arg(long)]
        lesson: Option<String>,
    },
    /// Community feed
    Posts {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Achievements
    Badges {
        #[command(flatten)]
        filter: FilterArgs,
    },
    Courses {
        #[command(flatten)]
        filter: FilterArgs,
    },
}

#[derive(ClapArgs, Debug)]
struct FilterArgs {
    /// Case-insensitive text to look for
    #[arg(short, long)]
    search: Option<String>,

    #[arg(short, long)]
    category: Option<String>,

    /// platform_wide, chapter_wide or course_specific
    #[arg(long)]
    scope: Option<Scope>,

    /// newest, oldest, title, name or points
    #[arg(long)]
    sort: Option<SortKey>,

    #[arg(short, long, default_value_t = 1)]
    page: usize,

    /// Only items owned by the signed-in user
    #[arg(long)]
    mine: bool,
}

type BoxError = Box<dyn StdError + Send + Sync>;

impl FilterArgs {
    fn view_name(&self, collection: &str) -> String {
        if self.mine {
            format!("{}.mine", collection)
        } else {
            collection.to_string()
        }
    }

    fn is_set(&self) -> bool {
        self.search.is_some() || self.category.is_some() || self.scope.is_some() || self.sort.is_some()
    }

    /// Flags given on the command line replace the saved filter; otherwise
    /// the saved one is used as is.
    fn resolve(&self, saved: Option<&SavedFilter>) -> SavedFilter {
        if !self.is_set() {
            return saved.cloned().unwrap_or_default();
        }
        SavedFilter {
            search: self.search.clone().unwrap_or_default(),
            category: self.category.clone(),
            scope: self.scope,
            sort: self.sort.unwrap_or_default(),
        }
    }
}

async fn browse<E>(
    client: &Client,
    prefs: &mut PrefsStore,
    filter: &FilterArgs,
    page_size: u32,
) -> Result<(Store<E>, ViewState<E>), BoxError>
where
    E: Entity,
    Client: Api<E>,
{
    let view = filter.view_name(E::COLLECTION);
    let saved = filter.resolve(prefs.filter(&view));
    prefs.set_filter(&view, saved.clone())?;

    let projection = saved.projection(filter.page, Some(page_size as usize));
    let mut query = ListQuery::matching(&projection, page_size);
    query.page = filter.page as u32;
    if filter.mine {
        query = query.owned_by(UserParam::Me);
    }

    let store = Store::new();
    // Failures land in the view state.
    let _ = store.load(client, query, LoadMode::Replace).await;

    // The server already paged; show everything it returned.
    let projection = saved.projection(1, None);
    let state = store.view(&projection);
    Ok((store, state))
}

fn render<E, F>(state: &ViewState<E>, line: F)
where
    F: Fn(&E) -> String,
{
    match state {
        ViewState::Loading => println!("Loading…"),
        ViewState::Failed { message, stale } => {
            println!("Could not load: {} (run again to retry)", message);
            for item in stale {
                println!("  {}", line(item));
            }
        }
        ViewState::Empty => println!("Nothing found."),
        ViewState::Populated { items, .. } => {
            for item in items {
                println!("{}", line(item));
            }
        }
    }
}

async fn run(args: Args) -> Result<(), BoxError> {
    let config = Config::from_env()?;
    let client = Arc::new(Client::from_config(&config)?);
    let mut prefs = PrefsStore::init(config.prefs_path.clone())?;
    let page_size = config.page_size;

    match &args.command {
        Command::Resources { filter, lesson } => {
            let lesson = lesson
                .as_deref()
                .map(|lesson| LessonAttachments::new(Arc::clone(&client), LessonId::from(lesson)));
            let load_attachments = async {
                match &lesson {
                    Some(lesson) => lesson.load().await.map(|_| ()),
                    None => Ok(()),
                }
            };
            let (browsed, attachments) = futures::join!(
                browse::<Resource>(&client, &mut prefs, filter, page_size),
                load_attachments
            );
            let (store, state) = browsed?;
            if let Err(err) = attachments {
                eprintln!("Could not load lesson attachments: {}", err);
            }
            render(&state, |resource| {
                let marker = match &lesson {
                    Some(lesson) => match lesson.state_of(&resource.id) {
                        Attachment::Attached => "[x] ",
                        Attachment::Detached => "[ ] ",
                        Attachment::Pending { .. } => "[~] ",
                    },
                    None => "",
                };
                format!(
                    "{}{}  {}  ({}, {})",
                    marker,
                    resource.id,
                    resource.title,
                    resource.category,
                    resource.scope.as_str()
                )
            });
            if store.has_more() {
                println!("More available: --page {}", filter.page + 1);
            }
        }
        Command::Posts { filter } => {
            let (_, state) = browse::<Post>(&client, &mut prefs, filter, page_size).await?;
            render(&state, |post| {
                format!(
                    "{}  {}: {}  [{} likes{}, {} comments]",
                    post.id,
                    post.author.name,
                    post.body,
                    post.like_count,
                    if post.liked { ", liked" } else { "" },
                    post.comment_count
                )
            });
        }
        Command::Badges { filter } => {
            let (_, state) = browse::<Badge>(&client, &mut prefs, filter, page_size).await?;
            render(&state, |badge| {
                format!(
                    "{} {}  {} pts  {:?}",
                    if badge.is_earned() { "*" } else { " " },
                    badge.name,
                    badge.points,
                    badge.rarity
                )
            });
        }
        Command::Courses { filter } => {
            let (_, state) = browse::<Course>(&client, &mut prefs, filter, page_size).await?;
            render(&state, |course| {
                format!(
                    "{}  {}  ({:?}, {} lessons, {} students{})",
                    course.id,
                    course.title,
                    course.level,
                    course.lesson_count,
                    course.student_count,
                    if course.is_published { "" } else { ", draft" }
                )
            });
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if let Err(err) = run(args).await {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}
