// SPDX-FileCopyrightText: © 2025 Airwave Contributors
//
// SPDX-License-Identifier: MPL-2.0

// Allowed: This is a CLI code generation tool, not server code.
#![allow(clippy::disallowed_macros)]

use std::fs;
use std::path::Path;
use ts_rs::TS;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let declarations = vec![
        // airwave-core types
        format!("// airwave-core\nexport {}", airwave_core::Track::decl()),
        format!("export {}", airwave_core::RotationMode::decl()),
        format!("export {}", airwave_core::StreamId::decl()),
        format!("export {}", airwave_core::ConnectionId::decl()),
        // airwave-api types
        format!("\n// airwave-api\nexport {}", airwave_api::MessageType::decl()),
        format!("export {}", airwave_api::RequestPayload::decl()),
        format!("export {}", airwave_api::ResponsePayload::decl()),
        format!("export {}", airwave_api::EventPayload::decl()),
        format!("export {}", airwave_api::BackgroundStatus::decl()),
        format!("export {}", airwave_api::ScheduleRequest::decl()),
        format!("export {}", airwave_api::ScheduleInfo::decl()),
        format!("export {}", airwave_api::ScheduleResponse::decl()),
        format!("export {}", airwave_api::OkResponse::decl()),
        format!("export {}", airwave_api::SkipResponse::decl()),
        format!("export {}", airwave_api::StreamInfo::decl()),
        format!("export {}", airwave_api::StreamStats::decl()),
        format!("export {}", airwave_api::HealthResponse::decl()),
        format!("export {}", airwave_api::ServerInfo::decl()),
        format!("export {}", airwave_api::ErrorBody::decl()),
    ];

    let output = declarations.join("\n\n");
    let content = format!("// This file is auto-generated. Do not edit it manually.\n\n{output}\n");

    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    let workspace_root = manifest_dir
        .parent()
        .and_then(|parent| parent.parent())
        .ok_or("Failed to find workspace root from CARGO_MANIFEST_DIR")?;
    let output_dir = workspace_root.join("bindings");
    fs::create_dir_all(&output_dir)?;
    let output_path = output_dir.join("airwave-types.ts");

    println!("Writing TypeScript bindings to: {}", output_path.display());
    fs::write(&output_path, content)?;
    println!("TypeScript bindings generated successfully.");

    Ok(())
}
