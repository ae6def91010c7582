//! Participants and organizer.

use url::Url;

use crate::event::{
    Attendee, AttendeeRole, CalendarEvent, CalendarUserType, Organizer, ParticipationStatus,
};
use crate::host::{
    HostCalendarItem, MeetingStatus, OrganizerRef, Participant, ParticipantType, ResponseStatus,
};
use crate::mapping::MappingContext;

/// Accepts plain `local@domain` addresses that also form a valid mailto URI.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    Url::parse(&format!("mailto:{email}")).is_ok()
}

/// Email if valid, otherwise None with a warning.
fn checked_email(ctx: &MappingContext<'_>, email: Option<&str>, who: &str) -> Option<String> {
    let email = email.map(str::trim).filter(|e| !e.is_empty())?;
    if is_valid_email(email) {
        Some(email.to_string())
    } else {
        ctx.warn(&format!(
            "Invalid email address '{email}' for {who}, using the name only"
        ));
        None
    }
}

fn partstat_for(response: ResponseStatus) -> ParticipationStatus {
    match response {
        ResponseStatus::Organized | ResponseStatus::Accepted => ParticipationStatus::Accepted,
        ResponseStatus::Declined => ParticipationStatus::Declined,
        ResponseStatus::Tentative => ParticipationStatus::Tentative,
        ResponseStatus::None | ResponseStatus::NotResponded => ParticipationStatus::NeedsAction,
    }
}

fn response_for(partstat: Option<ParticipationStatus>) -> ResponseStatus {
    match partstat {
        Some(ParticipationStatus::Accepted) => ResponseStatus::Accepted,
        Some(ParticipationStatus::Declined) => ResponseStatus::Declined,
        Some(ParticipationStatus::Tentative) => ResponseStatus::Tentative,
        _ => ResponseStatus::NotResponded,
    }
}

fn kind_for(attendee: &Attendee) -> ParticipantType {
    if matches!(
        attendee.cutype,
        Some(CalendarUserType::Resource | CalendarUserType::Room)
    ) {
        return ParticipantType::Resource;
    }
    match attendee.role {
        Some(AttendeeRole::Chair) => ParticipantType::Organizer,
        Some(AttendeeRole::OptionalParticipant | AttendeeRole::NonParticipant) => {
            ParticipantType::Optional
        }
        _ => ParticipantType::Required,
    }
}

/// Fill ATTENDEE and ORGANIZER from the item's participants.
pub fn map_attendees_outbound(
    ctx: &MappingContext<'_>,
    item: &HostCalendarItem,
    event: &mut CalendarEvent,
) {
    let schedule_agent_client = ctx.config.schedule_agent_is_client;
    event.attendees.clear();
    event.organizer = None;

    let mut own_emitted = false;
    for participant in &item.participants {
        let is_own = participant
            .email
            .as_deref()
            .is_some_and(|e| ctx.identity.matches(e));

        if is_own {
            if item.meeting_status.is_received() && !own_emitted {
                let response = if item.meeting_status == MeetingStatus::ReceivedAndCanceled {
                    ResponseStatus::Declined
                } else {
                    item.response_status
                };
                let mut own = Attendee::new(participant.email.clone(), participant.name.clone());
                own.partstat = Some(partstat_for(response));
                own.role = Some(AttendeeRole::RequiredParticipant);
                own.schedule_agent_client = schedule_agent_client;
                event.attendees.push(own);
                own_emitted = true;
            }
            continue;
        }

        let who = participant
            .name
            .as_deref()
            .or(participant.email.as_deref())
            .unwrap_or("participant");
        let email = checked_email(ctx, participant.email.as_deref(), who);
        let name = participant
            .name
            .clone()
            .or_else(|| email.is_none().then(|| participant.email.clone()).flatten());
        if email.is_none() && name.is_none() {
            continue;
        }

        let mut attendee = Attendee::new(email, name);
        attendee.partstat = Some(partstat_for(participant.response));
        attendee.schedule_agent_client = schedule_agent_client;
        match participant.kind {
            ParticipantType::Organizer => attendee.role = Some(AttendeeRole::Chair),
            ParticipantType::Optional => {
                attendee.role = Some(AttendeeRole::OptionalParticipant);
                attendee.rsvp = true;
            }
            ParticipantType::Required => {
                attendee.role = Some(AttendeeRole::RequiredParticipant);
                attendee.rsvp = true;
            }
            ParticipantType::Resource => {
                attendee.role = Some(AttendeeRole::RequiredParticipant);
                attendee.cutype = Some(CalendarUserType::Resource);
                attendee.rsvp = true;
            }
        }
        event.attendees.push(attendee);
    }

    event.organizer = organizer_outbound(ctx, item);
}

fn organizer_outbound(ctx: &MappingContext<'_>, item: &HostCalendarItem) -> Option<Organizer> {
    let (name, email) = if let Some(p) = item
        .participants
        .iter()
        .find(|p| p.kind == ParticipantType::Organizer)
    {
        (p.name.clone(), p.email.clone())
    } else if let Some(organizer) = &item.organizer {
        (organizer.name.clone(), organizer.email.clone())
    } else if item.meeting_status == MeetingStatus::Meeting {
        (None, ctx.identity.preferred_email().map(str::to_string))
    } else {
        return None;
    };

    let who = name.as_deref().unwrap_or("organizer");
    let valid = checked_email(ctx, email.as_deref(), who);
    let name = name.or_else(|| valid.is_none().then_some(email).flatten());
    if valid.is_none() && name.is_none() {
        return None;
    }

    Some(Organizer {
        email: valid,
        name,
        schedule_agent_client: ctx.config.schedule_agent_is_client,
    })
}

fn same_person(participant: &Participant, attendee: &Attendee) -> bool {
    match (&participant.email, &attendee.email) {
        (Some(a), Some(b)) => a.trim().eq_ignore_ascii_case(b.trim()),
        _ => match (&participant.name, &attendee.name) {
            (Some(a), Some(b)) => a.trim().eq_ignore_ascii_case(b.trim()),
            _ => false,
        },
    }
}

/// Reconcile the item's participants and meeting state with the event.
pub fn map_attendees_inbound(
    ctx: &MappingContext<'_>,
    event: &CalendarEvent,
    item: &mut HostCalendarItem,
) {
    let is_own_attendee = |a: &Attendee| a.email.as_deref().is_some_and(|e| ctx.identity.matches(e));
    let is_own_participant =
        |p: &Participant| p.email.as_deref().is_some_and(|e| ctx.identity.matches(e));

    let mut matched = vec![false; event.attendees.len()];
    let mut participants = Vec::with_capacity(event.attendees.len());

    for participant in &item.participants {
        let found = event
            .attendees
            .iter()
            .enumerate()
            .find(|(i, a)| !matched[*i] && same_person(participant, a));
        match found {
            Some((index, attendee)) => {
                matched[index] = true;
                participants.push(Participant {
                    name: attendee.name.clone().or_else(|| participant.name.clone()),
                    email: participant.email.clone(),
                    kind: kind_for(attendee),
                    response: response_for(attendee.partstat),
                });
            }
            None if is_own_participant(participant) => participants.push(participant.clone()),
            None => {}
        }
    }

    for (attendee, _) in event
        .attendees
        .iter()
        .zip(&matched)
        .filter(|(_, matched)| !**matched)
    {
        if is_own_attendee(attendee) {
            continue;
        }
        participants.push(Participant {
            name: attendee.name.clone(),
            email: attendee.email.clone(),
            kind: kind_for(attendee),
            response: response_for(attendee.partstat),
        });
    }
    item.participants = participants;

    let own_response = event
        .attendees
        .iter()
        .find(|a| is_own_attendee(*a))
        .map(|a| response_for(a.partstat));

    match &event.organizer {
        Some(organizer)
            if !organizer
                .email
                .as_deref()
                .is_some_and(|e| ctx.identity.matches(e)) =>
        {
            let reference = OrganizerRef {
                name: organizer.name.clone(),
                email: organizer.email.clone(),
            };
            item.organizer = Some(reference.clone());
            item.sent_on_behalf_of = Some(reference);
            item.response_status = own_response.unwrap_or(ResponseStatus::NotResponded);
            item.meeting_status = if item.response_status == ResponseStatus::Declined {
                MeetingStatus::ReceivedAndCanceled
            } else {
                MeetingStatus::Received
            };
        }
        Some(organizer) => {
            item.organizer = Some(OrganizerRef {
                name: organizer.name.clone(),
                email: organizer.email.clone(),
            });
            item.sent_on_behalf_of = None;
            item.meeting_status = MeetingStatus::Meeting;
            item.response_status = ResponseStatus::Organized;
        }
        None if event.attendees.is_empty() => {
            item.organizer = None;
            item.sent_on_behalf_of = None;
            item.meeting_status = MeetingStatus::NonMeeting;
            item.response_status = ResponseStatus::None;
        }
        None => {}
    }
}
