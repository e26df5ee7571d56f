//! Building the stats request and decoding replies
use hickory_proto::{
    op::{Message, MessageType, OpCode, Query},
    rr::{DNSClass, Name, RData, RecordType},
};
use tracing::trace;

use crate::{
    errors::{Result, StatsError},
    stat::{self, QUESTIONS, Reading, SERVERS, ServerStat, StatRecord, Strategy},
};

/// Build the single request carrying all seven CHAOS TXT questions
pub fn stats_request() -> Result<Message> {
    let mut message = Message::new();
    message
        .set_id(rand::random())
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true);

    for name in QUESTIONS {
        let mut query = Query::new();
        query
            .set_name(Name::from_ascii(name)?)
            .set_query_class(DNSClass::CH)
            .set_query_type(RecordType::TXT);
        message.add_query(query);
    }
    Ok(message)
}

/// Decode the answers of a stats reply in order, handing every value to
/// `on_value` as soon as it is decoded. Values delivered before an error are
/// not taken back.
pub fn decode_reply<F>(reply: &Message, mut on_value: F) -> Result<()>
where
    F: FnMut(Reading),
{
    for record in reply.answers() {
        let RData::TXT(txt) = record.data() else {
            continue;
        };
        let name = record.name().to_ascii();
        let Some(strategy) = stat::strategy(&name) else {
            // ignore unexpected answers from dnsmasq
            trace!(%name, "skipping unknown stats record");
            continue;
        };
        let strings = txt
            .txt_data()
            .iter()
            .map(|s| String::from_utf8_lossy(s))
            .collect::<Vec<_>>();

        match strategy {
            Strategy::Scalar(stat) => {
                if strings.len() != 1 {
                    return Err(StatsError::UnexpectedReplies {
                        name,
                        got: strings.len(),
                        want: 1,
                    });
                }
                let value = parse_value(&name, &strings[0])?;
                on_value(Reading::Stat(StatRecord { stat, value }));
            }
            Strategy::Servers => {
                for s in &strings {
                    on_value(Reading::Server(parse_server(s)?));
                }
            }
        }
    }
    Ok(())
}

/// parse one `address queries failed` string from `servers.bind.`
pub fn parse_server(s: &str) -> Result<ServerStat> {
    let fields = s.split_whitespace().collect::<Vec<_>>();
    let [server, queries, failed] = fields[..] else {
        return Err(StatsError::UnexpectedFields {
            got: fields.len(),
            want: 3,
        });
    };
    Ok(ServerStat {
        server: server.to_owned(),
        queries: parse_value(SERVERS, queries)?,
        queries_failed: parse_value(SERVERS, failed)?,
    })
}

fn parse_value(name: &str, value: &str) -> Result<f64> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|source| StatsError::ParseValue {
            name: name.to_owned(),
            value: value.to_owned(),
            source,
        })
}
