use std::env;
use std::error::Error;
use std::io::{self, BufRead};
use std::sync::Arc;

use dotenv::dotenv;
use slog::{debug, info, o};
use structopt::StructOpt;

use collector::audio;
use collector::config::{get_ffprobe, get_variable};
use collector::credentials::Password;
use collector::db::PgDb;
use collector::device::NewDevice;
use collector::environment::{Config, Environment};
use collector::gateway::Devices;
use collector::store::MemoryStore;
use logging::initialize_logger;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "register-device",
    about = "Register a device, reading its password from standard input"
)]
struct Opt {
    /// The name the device will log in with
    devicename: String,

    /// Where the device is deployed
    #[structopt(long)]
    location: Option<String>,

    /// Let anyone view the device
    #[structopt(long)]
    public: bool,

    /// Only check whether the name is free
    #[structopt(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();

    let opt = Opt::from_args();

    let logger = Arc::new(initialize_logger().new(o!("devicename" => opt.devicename.clone())));

    let connection_string = get_variable("BACKEND_DB_CONNECTION_STRING");
    let pool = sqlx::PgPool::connect(&connection_string)
        .await
        .expect("create database pool from BACKEND_DB_CONNECTION_STRING");
    let db = Arc::new(PgDb::new(pool));

    let ffprobe_path = get_ffprobe(env::var("BACKEND_FFPROBE_PATH").ok());
    let prober = Arc::new(audio::make_wrapper(logger.clone(), ffprobe_path));

    // registration never touches blob storage
    let store = Arc::new(MemoryStore::new());

    let environment = Environment::new(logger.clone(), db, store, prober, Config::from_env());
    let devices = Devices::new(environment);

    if opt.check {
        let free = devices.free_devicename(&opt.devicename).await?;
        println!("{}", if free { "free" } else { "taken" });
        return Ok(());
    }

    info!(logger, "Reading password from standard input...");
    let mut password = String::new();
    io::stdin().lock().read_line(&mut password)?;
    let password = password.trim_end_matches(&['\r', '\n'][..]);

    let device = devices
        .register(NewDevice {
            devicename: opt.devicename,
            password: Password::new(password),
            location: opt.location,
            public: opt.public,
            new_config: None,
        })
        .await?;

    debug!(logger, "Registered device"; "id" => device.id);
    println!("Registered device {} as {:?}", device.id, device.devicename);

    Ok(())
}
