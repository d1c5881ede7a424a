use std::error::Error;
use crossbeam::channel;
use dotenv::dotenv;
use ledudp_driver_rs::common::logger::init_logger;
use ledudp_driver_rs::common::setting::Settings;
use ledudp_driver_rs::{info, LedUdpDevice};

const LOG_TAG: &str = "main";
const USAGE: &str = "usage: ledudp [red green blue [frequency]]";

fn main() -> Result<(), Box<dyn Error>> {
    // 检查 env 文件
    dotenv().ok();

    // 加载 config
    let settings = Settings::get();

    // 设置 logger
    init_logger()?;
    log::info!("settings loaded, env: {:?}", settings.env.env);
    log::debug!("settings: {:?}", settings);

    let args: Vec<u32> = std::env::args()
        .skip(1)
        .map(|a| a.parse::<u32>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("{}, {}", USAGE, e))?;

    let mut device = LedUdpDevice::from_settings(settings)?;
    match args.as_slice() {
        [] => {}
        [red, green, blue] => device.set_rgb(*red, *green, *blue, None)?,
        [red, green, blue, frequency] => device.set_rgb(*red, *green, *blue, Some(*frequency))?,
        _ => return Err(USAGE.into()),
    }

    let mismatches = device.get_current_rgb()?;
    let report = serde_json::json!({
        "name": device.name(),
        "address": device.identity().address(),
        "rgb": device.current_rgb(),
        "mismatches": mismatches,
    });
    println!("{}", serde_json::to_string(&report)?);

    // 等待 ctrl-c
    let (stop_tx, stop_rx) = channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })?;
    info!(LOG_TAG, "running, press Ctrl-C to stop");
    let _ = stop_rx.recv();

    device.stop();
    Ok(())
}
