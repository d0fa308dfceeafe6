//! Drive an engine through a load and a resize, printing what a host would show

use pageheat::engine::JsonRecordSource;
use pageheat::{BearerToken, HeatmapConfig, HeatmapEngine, InputFormat, Surface};

fn main() {
    let records = r#"[
        {
            "id": 101,
            "created_at": "2024-06-30T09:15:00Z",
            "time_on_page_seconds": "184",
            "buttons_clicked": "{\"Оставить заявку\": 2, \"input#phone\": 1, \"svg\": 3}",
            "cursor_hover_data": "{\"w\": 1440, \"h\": 3200, \"pts\": [[720, 400], [730, 410], [700, 1600]]}"
        },
        {
            "id": 102,
            "created_at": "2024-06-25 18:40:12",
            "time_on_page_seconds": 47,
            "buttons_clicked": {"Позвонить": 1},
            "cursor_hover_data": {"w": 390, "h": 4100, "pts": [[195, 520], [200, 530]]}
        }
    ]"#;

    let engine = HeatmapEngine::new(HeatmapConfig::default())
        .and_then(|engine| engine.with_surface(Surface::new(96, 160)));
    let mut engine = match engine {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error: {e}");
            return;
        }
    };

    if let Err(e) = engine.authenticate(BearerToken::new("demo-token")) {
        eprintln!("Error: {e}");
        return;
    }

    let mut source = JsonRecordSource::from_body(records, InputFormat::Json);
    match engine.refresh_with(&mut source) {
        Ok(outcome) => println!("refresh: {outcome:?}, state: {}", engine.state()),
        Err(e) => {
            eprintln!("Error: {e}");
            return;
        }
    }

    print_coverage(&engine);
    if let Err(e) = engine.resize(Surface::new(48, 80)) {
        eprintln!("Error: {e}");
        return;
    }
    print_coverage(&engine);

    match engine.dashboard_json() {
        Ok(Some(json)) => println!("{json}"),
        Ok(None) => println!("no dashboard"),
        Err(e) => eprintln!("Error: {e}"),
    }
}

fn print_coverage(engine: &HeatmapEngine) {
    if let Some(frame) = engine.frame() {
        let surface = frame.surface();
        let lit = frame.pixels().chunks_exact(4).filter(|px| px[3] > 0).count();
        println!(
            "{}x{} frame: {} of {} pixels colored",
            surface.width,
            surface.height,
            lit,
            surface.cell_count()
        );
    }
}
