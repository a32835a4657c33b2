use chrono::NaiveDate;
use keyset::{Page, Row, Value};

/// Table every backend seeds the fixtures into
pub const PEOPLE_TABLE: &str = "people";

/// Fixture record for pagination scenarios
#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub nickname: Option<String>,
    pub born: NaiveDate,
    pub score: f64,
}

impl Person {
    pub fn new(id: i64, first_name: &str, last_name: &str) -> Self {
        Self {
            id,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            nickname: None,
            born: NaiveDate::from_ymd_opt(2000, 1, 1).expect("valid date"),
            score: 0.0,
        }
    }

    pub fn with_nickname(mut self, nickname: &str) -> Self {
        self.nickname = Some(nickname.to_string());
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = score;
        self
    }

    pub fn born(mut self, year: i32, month: u32, day: u32) -> Self {
        self.born = NaiveDate::from_ymd_opt(year, month, day).expect("valid date");
        self
    }

    pub fn into_row(self) -> Row {
        Row::from([
            ("id".to_string(), Value::Int(self.id)),
            ("first_name".to_string(), Value::Text(self.first_name)),
            ("last_name".to_string(), Value::Text(self.last_name)),
            ("nickname".to_string(), Value::from(self.nickname)),
            ("born".to_string(), Value::Date(self.born)),
            ("score".to_string(), Value::Float(self.score)),
        ])
    }
}

/// Six people in three first-name groups: Abe (1, 2), Bea (3, 4), Cal (5, 6).
pub fn name_groups() -> Vec<Person> {
    ["Abe", "Abe", "Bea", "Bea", "Cal", "Cal"]
        .into_iter()
        .zip(1..)
        .map(|(first_name, id)| Person::new(id, first_name, "Smith"))
        .collect()
}

/// `count` people with ids `1..=count`, distinct names and spread-out birthdays.
pub fn numbered(count: i64) -> Vec<Person> {
    (1..=count)
        .map(|id| {
            let month = u32::try_from(id % 12 + 1).expect("month in range");
            Person::new(id, &format!("Person{id:03}"), "Doe").born(1950 + (id * 7) as i32 % 50, month, 1)
        })
        .collect()
}

/// Ids of the page's nodes, in page order.
pub fn ids(page: &Page<Row>) -> Vec<i64> {
    page.nodes()
        .map(|row| match row.get("id") {
            Some(Value::Int(id)) => *id,
            other => panic!("row has no integer id: {other:?}"),
        })
        .collect()
}
