//! Cerial demo
//!
//! Encode beberapa contoh record graph, hex-dump buffer-nya, decode kembali
//! dan cek allocator seimbang. Dengan `--image` setiap buffer juga di-append
//! ke memory-mapped image dan di-decode lagi dari sana.
//!
//! Usage:
//!   cargo run --release -- [all|repo|hub|team] [--image PATH] [--verbose]

use std::ffi::{c_char, c_float, c_int, CStr};
use std::mem::offset_of;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cerial::core::{Image, ObjList, System, Tracking};
use cerial::{decode, encode, Field, Model, Reflect};

// =============================================================================
// Sample records
// =============================================================================

#[repr(C)]
struct SubSub {
    a: *const c_char,
    b: c_float,
}

unsafe impl Reflect for SubSub {
    const MODEL: Model = &[
        Field::string("a", offset_of!(SubSub, a)),
        Field::float("b", offset_of!(SubSub, b)),
        Field::object::<SubSub>(),
    ];
}

#[repr(C)]
struct Sub {
    a: *const c_char,
    b: c_int,
    sub: [SubSub; 2],
}

unsafe impl Reflect for Sub {
    const MODEL: Model = &[
        Field::string("a", offset_of!(Sub, a)),
        Field::int("b", offset_of!(Sub, b)),
        Field::array("sub", offset_of!(Sub, sub), 2, SubSub::MODEL),
        Field::object::<Sub>(),
    ];
}

#[repr(C)]
struct Repo {
    name: *const c_char,
    alias: *const c_char,
    id: c_int,
    sub: *mut Sub,
}

unsafe impl Reflect for Repo {
    const MODEL: Model = &[
        Field::string("name", offset_of!(Repo, name)),
        Field::string("alias", offset_of!(Repo, alias)),
        Field::int("id", offset_of!(Repo, id)),
        Field::struct_ptr("sub", offset_of!(Repo, sub), Sub::MODEL),
        Field::object::<Repo>(),
    ];
}

#[repr(C)]
struct Project {
    id: c_int,
    name: *const c_char,
}

unsafe impl Reflect for Project {
    const MODEL: Model = &[
        Field::int("id", offset_of!(Project, id)),
        Field::string("name", offset_of!(Project, name)),
        Field::object::<Project>(),
    ];
}

#[repr(C)]
struct Hub {
    id: c_int,
    user: *const c_char,
    project: *mut Project,
}

unsafe impl Reflect for Hub {
    const MODEL: Model = &[
        Field::int("id", offset_of!(Hub, id)),
        Field::string("user", offset_of!(Hub, user)),
        Field::struct_ptr("project", offset_of!(Hub, project), Project::MODEL),
        Field::object::<Hub>(),
    ];
}

#[repr(C)]
struct Member {
    name: *const c_char,
    score: *mut c_int,
}

unsafe impl Reflect for Member {
    const MODEL: Model = &[
        Field::string("name", offset_of!(Member, name)),
        Field::int_ptr("score", offset_of!(Member, score)),
        Field::object::<Member>(),
    ];
}

#[repr(C)]
struct Team {
    id: c_int,
    members: ObjList,
}

unsafe impl Reflect for Team {
    const MODEL: Model = &[
        Field::int("id", offset_of!(Team, id)),
        Field::list("members", offset_of!(Team, members), Member::MODEL),
        Field::object::<Team>(),
    ];
}

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Demo {
    All,
    Repo,
    Hub,
    Team,
}

#[derive(Parser)]
#[command(name = "cerial")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Position-independent C record codec demo", long_about = None)]
struct Cli {
    /// Which sample graph to run
    #[arg(value_enum, default_value = "all")]
    demo: Demo,

    /// Also append every buffer to this memory-mapped image
    #[arg(short, long)]
    image: Option<PathBuf>,

    /// Image capacity in KB (default: 64)
    #[arg(long)]
    image_size: Option<usize>,

    /// Hex dump bytes per row (default: 16)
    #[arg(short, long)]
    width: Option<usize>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Demo configuration
#[derive(Debug, Clone)]
struct Config {
    demo: Demo,
    image_path: Option<PathBuf>,
    image_size_kb: usize,
    dump_width: usize,
    verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            demo: Demo::All,
            image_path: None,
            image_size_kb: 64,
            dump_width: 16,
            verbose: false,
        }
    }
}

impl From<Cli> for Config {
    fn from(cli: Cli) -> Self {
        let mut config = Config {
            demo: cli.demo,
            image_path: cli.image,
            verbose: cli.verbose,
            ..Config::default()
        };
        if let Some(kb) = cli.image_size {
            config.image_size_kb = kb;
        }
        if let Some(width) = cli.width.filter(|&w| w > 0) {
            config.dump_width = width;
        }
        config
    }
}

// =============================================================================
// Demo driver
// =============================================================================

fn main() -> Result<()> {
    let config = Config::from(Cli::parse());

    let filter = if config.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let mut image = match &config.image_path {
        Some(path) => Some(
            Image::open(path, config.image_size_kb * 1024)
                .with_context(|| format!("failed to open image {}", path.display()))?,
        ),
        None => None,
    };

    if let Some(image) = &image {
        for (offset, entry) in image.entries() {
            info!(offset, len = entry.len(), "existing image entry");
        }
    }

    let run_all = config.demo == Demo::All;
    if run_all || config.demo == Demo::Repo {
        repo_demo(&config, image.as_mut())?;
    }
    if run_all || config.demo == Demo::Hub {
        hub_demo(&config, image.as_mut())?;
    }
    if run_all || config.demo == Demo::Team {
        team_demo(&config, image.as_mut())?;
    }

    if let Some(image) = &image {
        image.flush()?;
        info!(used = image.len(), capacity = image.capacity(), "image flushed");
    }

    Ok(())
}

/// Encode, dump, decode (and optionally persist) one graph, then check that
/// every allocation was returned.
fn roundtrip<T: Reflect>(
    label: &str,
    obj: &T,
    config: &Config,
    image: Option<&mut Image>,
    show: impl Fn(&T),
) -> Result<()> {
    let alloc = Tracking::new();

    // SAFETY: demo graphs only point at live locals and string literals
    let encoded = unsafe { encode(obj, &alloc) }?;
    info!(demo = label, size = encoded.len(), "encoded");
    hex_dump(&encoded, config.dump_width);

    {
        let decoded = decode::<T, _>(&encoded, &alloc)?;
        show(&*decoded);

        if let Some(image) = image {
            let offset = image.append(&encoded)?;
            let stored = image.get(offset).context("image entry missing")?;
            let relocated = decode::<T, _>(stored, &alloc)?;
            info!(demo = label, offset, "decoded from image");
            show(&*relocated);
        }
    }
    drop(encoded);

    if alloc.live() != 0 || alloc.invalid_releases() != 0 {
        bail!(
            "{label}: allocator unbalanced ({} live, {} invalid releases)",
            alloc.live(),
            alloc.invalid_releases()
        );
    }
    info!(
        demo = label,
        allocations = alloc.allocations(),
        releases = alloc.releases(),
        "allocator balanced"
    );
    Ok(())
}

fn repo_demo(config: &Config, image: Option<&mut Image>) -> Result<()> {
    let mut sub = Sub {
        a: c"zkq".as_ptr(),
        b: 0x100,
        sub: [
            SubSub {
                a: c"dsgahfdahfhda".as_ptr(),
                b: 123.456,
            },
            SubSub {
                a: c"45448465480".as_ptr(),
                b: 94.456,
            },
        ],
    };
    let repo = Repo {
        name: c"hello world".as_ptr(),
        alias: c"zjx".as_ptr(),
        id: 0xFF,
        sub: &mut sub,
    };

    roundtrip("repo", &repo, config, image, |r| unsafe {
        info!(name = %text(r.name), alias = %text(r.alias), id = r.id, "repo");
        let sub = &*r.sub;
        info!(a = %text(sub.a), b = sub.b, "repo.sub");
        for item in &sub.sub {
            info!(a = %text(item.a), b = item.b, "repo.sub.sub");
        }
    })
}

fn hub_demo(config: &Config, image: Option<&mut Image>) -> Result<()> {
    let mut project = Project {
        id: 255,
        name: c"c serializable".as_ptr(),
    };
    let hub = Hub {
        id: 65535,
        user: c"Letter".as_ptr(),
        project: &mut project,
    };

    roundtrip("hub", &hub, config, image, |h| unsafe {
        let project = &*h.project;
        info!(
            id = h.id,
            user = %text(h.user),
            project.id = project.id,
            project.name = %text(project.name),
            "hub"
        );
    })
}

fn team_demo(config: &Config, image: Option<&mut Image>) -> Result<()> {
    let mut scores: [c_int; 3] = [42, 7, 19];
    let names = [c"ada".as_ptr(), c"grace".as_ptr(), c"linus".as_ptr()];
    let mut members: Vec<Member> = names
        .iter()
        .zip(scores.iter_mut())
        .map(|(&name, score)| Member {
            name,
            score: score as *mut c_int,
        })
        .collect();

    let mut team = Team {
        id: 3,
        members: ObjList::new(),
    };
    for member in members.iter_mut() {
        team.members.push((member as *mut Member).cast(), &System)?;
    }

    let result = roundtrip("team", &team, config, image, |t| unsafe {
        info!(id = t.id, members = t.members.len(), "team");
        for payload in t.members.iter() {
            let member = &*payload.cast::<Member>();
            let score = member.score.as_ref().copied();
            info!(name = %text(member.name), score = ?score, "team.member");
        }
    });

    // SAFETY: nodes were pushed with System above
    unsafe { team.members.clear(&System) };
    result
}

unsafe fn text(s: *const c_char) -> String {
    if s.is_null() {
        "<null>".to_owned()
    } else {
        CStr::from_ptr(s).to_string_lossy().into_owned()
    }
}

fn hex_dump(bytes: &[u8], width: usize) {
    for (row, chunk) in bytes.chunks(width).enumerate() {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
        let ascii: String = chunk
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
            .collect();
        println!(
            "  {:08x}: {:<pad$}  {}",
            row * width,
            hex.join(" "),
            ascii,
            pad = width * 3 - 1
        );
    }
}
