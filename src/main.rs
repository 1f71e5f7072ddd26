use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::json;

use lorawan_ns::lorawan::crypto::{self, AesKey, Direction};
use lorawan_ns::lorawan::frame::{self, MType};
use lorawan_ns::util::hex::{decode_hex, encode_hex};
use lorawan_ns::init_logger;

#[derive(Parser)]
#[command(name = "lorawan-cli")]
#[command(about = "CLI tool for inspecting LoRaWAN PHY payloads")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a PHY payload and print its fields as JSON
    Decode {
        /// Hex-encoded PHY payload
        payload: String,
    },
    /// Verify the MIC of a data uplink or join-request
    VerifyMic {
        /// Hex-encoded PHY payload
        payload: String,
        /// Hex-encoded NwkSKey (data frames) or AppKey (join-requests)
        key: String,
        /// Full 32-bit frame counter for data frames; defaults to the
        /// 16-bit wire value
        #[arg(short, long)]
        fcnt: Option<u32>,
    },
    /// Decrypt the FRMPayload of a data frame
    Decrypt {
        /// Hex-encoded PHY payload
        payload: String,
        /// Hex-encoded AppSKey (or NwkSKey for FPort 0)
        key: String,
        /// Full 32-bit frame counter; defaults to the 16-bit wire value
        #[arg(short, long)]
        fcnt: Option<u32>,
        /// Treat the frame as a downlink
        #[arg(short, long)]
        downlink: bool,
    },
}

fn main() -> anyhow::Result<()> {
    init_logger();

    let cli = Cli::parse();
    match cli.command {
        Commands::Decode { payload } => {
            let phy = decode_hex(&payload).context("payload is not valid hex")?;
            let (msg, mic) = frame::split_mic(&phy)?;
            let mtype = MType::try_from(msg[0])?;
            let value = match mtype {
                MType::JoinRequest => {
                    let request = frame::parse_join_request(msg)?;
                    json!({
                        "mtype": mtype.to_string(),
                        "appeui": request.appeui.to_string(),
                        "deveui": request.deveui.to_string(),
                        "devnonce": request.devnonce.to_string(),
                        "mic": encode_hex(&mic),
                    })
                }
                MType::JoinAccept => json!({
                    "mtype": mtype.to_string(),
                    "encrypted_body": encode_hex(&phy[1..]),
                }),
                _ => {
                    let data = frame::parse_data_frame(msg)?;
                    json!({
                        "mtype": mtype.to_string(),
                        "devaddr": data.devaddr.to_string(),
                        "adr": data.fctrl.adr,
                        "ack": data.fctrl.ack,
                        "fcnt": data.fcnt,
                        "fopts": encode_hex(&data.fopts),
                        "fport": data.fport,
                        "frm_payload": encode_hex(&data.frm_payload),
                        "mic": encode_hex(&mic),
                    })
                }
            };
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Commands::VerifyMic { payload, key, fcnt } => {
            let phy = decode_hex(&payload).context("payload is not valid hex")?;
            let key = AesKey::from_hex(&key)?;
            let (msg, mic) = frame::split_mic(&phy)?;
            let mtype = MType::try_from(msg[0])?;
            let expected = match mtype {
                MType::JoinRequest | MType::JoinAccept => crypto::join_mic(&key, msg),
                _ => {
                    let data = frame::parse_data_frame(msg)?;
                    let dir = if mtype.is_data_uplink() {
                        Direction::Uplink
                    } else {
                        Direction::Downlink
                    };
                    let fcnt = fcnt.unwrap_or(u32::from(data.fcnt));
                    crypto::data_mic(&key, dir, data.devaddr, fcnt, msg)
                }
            };
            if expected == mic {
                println!("MIC ok ({})", encode_hex(&mic));
            } else {
                bail!("MIC mismatch: frame carries {}, expected {}", encode_hex(&mic), encode_hex(&expected));
            }
        }
        Commands::Decrypt { payload, key, fcnt, downlink } => {
            let phy = decode_hex(&payload).context("payload is not valid hex")?;
            let key = AesKey::from_hex(&key)?;
            let (msg, _) = frame::split_mic(&phy)?;
            let data = frame::parse_data_frame(msg)?;
            let dir = if downlink { Direction::Downlink } else { Direction::Uplink };
            let fcnt = fcnt.unwrap_or(u32::from(data.fcnt));
            let plain = crypto::payload_cipher(&key, dir, data.devaddr, fcnt, &data.frm_payload);
            println!("{}", encode_hex(&plain));
            if let Ok(text) = std::str::from_utf8(&plain) {
                if text.chars().all(|c| !c.is_control()) {
                    println!("utf-8: {text}");
                }
            }
        }
    }

    Ok(())
}
