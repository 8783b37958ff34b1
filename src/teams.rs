use chrono::Utc;
use uuid::Uuid;

use super::models::Team;
use super::state::AppState;

// --- Team Seeding ---

// (name, symbol, primary color, secondary color)
pub const NFL_TEAMS: [(&str, &str, &str, &str); 32] = [
    ("Arizona Cardinals", "ARI", "#97233F", "#000000"),
    ("Atlanta Falcons", "ATL", "#A71930", "#000000"),
    ("Baltimore Ravens", "BAL", "#241773", "#000000"),
    ("Buffalo Bills", "BUF", "#00338D", "#C60C30"),
    ("Carolina Panthers", "CAR", "#0085CA", "#101820"),
    ("Chicago Bears", "CHI", "#0B162A", "#C83803"),
    ("Cincinnati Bengals", "CIN", "#FB4F14", "#000000"),
    ("Cleveland Browns", "CLE", "#FF3C00", "#311D00"),
    ("Dallas Cowboys", "DAL", "#003594", "#869397"),
    ("Denver Broncos", "DEN", "#FB4F14", "#002244"),
    ("Detroit Lions", "DET", "#0076B6", "#B0B7BC"),
    ("Green Bay Packers", "GB", "#203731", "#FFB612"),
    ("Houston Texans", "HOU", "#03202F", "#A71930"),
    ("Indianapolis Colts", "IND", "#002C5F", "#A2AAAD"),
    ("Jacksonville Jaguars", "JAX", "#101820", "#D7A22A"),
    ("Kansas City Chiefs", "KC", "#E31837", "#FFB81C"),
    ("Las Vegas Raiders", "LV", "#000000", "#A5ACAF"),
    ("Los Angeles Chargers", "LAC", "#0080C6", "#FFC20E"),
    ("Los Angeles Rams", "LAR", "#003594", "#FFA300"),
    ("Miami Dolphins", "MIA", "#008E97", "#FC4C02"),
    ("Minnesota Vikings", "MIN", "#4F2683", "#FFC62F"),
    ("New England Patriots", "NE", "#002244", "#C60C30"),
    ("New Orleans Saints", "NO", "#D3BC8D", "#101820"),
    ("New York Giants", "NYG", "#0B2265", "#A71930"),
    ("New York Jets", "NYJ", "#125740", "#000000"),
    ("Philadelphia Eagles", "PHI", "#004C54", "#A5ACAF"),
    ("Pittsburgh Steelers", "PIT", "#FFB612", "#101820"),
    ("San Francisco 49ers", "SF", "#AA0000", "#B3995D"),
    ("Seattle Seahawks", "SEA", "#002244", "#69BE28"),
    ("Tampa Bay Buccaneers", "TB", "#D50A0A", "#B1BABF"),
    ("Tennessee Titans", "TEN", "#0C2340", "#4B92DB"),
    ("Washington Commanders", "WAS", "#773141", "#FFB612"),
];

/// Populates the team map with the 32 NFL teams if it is empty.
/// Existing teams (and their supplies) are left untouched.
pub fn seed_teams(state: &AppState) -> usize {
    if !state.teams.is_empty() {
        return 0;
    }
    let mut seeded = 0;
    for (name, symbol, primary_color, secondary_color) in NFL_TEAMS {
        let team = Team {
            id: Uuid::new_v4(),
            name: name.to_string(),
            symbol: symbol.to_string(),
            total_supply: 0.0,
            market_cap: 0.0,
            volume: 0.0,
            primary_color: primary_color.to_string(),
            secondary_color: secondary_color.to_string(),
            created_at: Utc::now(),
            price: None,
        };
        state.teams.insert(team.id, team);
        seeded += 1;
    }
    seeded
}
