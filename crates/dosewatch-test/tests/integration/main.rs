mod escalation;
mod helpers;
mod marking;
mod queue;
mod scheduling;
